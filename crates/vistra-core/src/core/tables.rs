use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named palette mapping element or species names to RGBA colors.
/// The engine carries these tables opaquely; their content belongs to the
/// rendering layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorSet {
    pub colors: BTreeMap<String, [f32; 4]>,
}

/// A named set of forcefield display parameters keyed by atom type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForcefieldSet {
    pub parameters: BTreeMap<String, f64>,
}

/// Auxiliary lookup tables stored alongside the tree in the archive, each
/// in its own independently addressable entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuxTables {
    pub color_sets: BTreeMap<String, ColorSet>,
    pub forcefield_sets: BTreeMap<String, ForcefieldSet>,
}
