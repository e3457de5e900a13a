use rand::RngCore;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    /// Runtime handle for a node in the tree arena. Never persisted.
    pub struct NodeId;
}

/// Persistent unique identifier for a node.
///
/// Stable ids survive save/load cycles and key the node's payload entry in
/// the archive, independent of the node's position in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StableId(String);

impl StableId {
    /// Generates a fresh random 128-bit identifier, hex-encoded.
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let mut s = String::with_capacity(32);
        for b in bytes {
            s.push_str(&format!("{:02x}", b));
        }
        StableId(s)
    }

    /// Wraps an already-known identifier, e.g. one read back from an archive.
    pub fn from_string(s: impl Into<String>) -> Self {
        StableId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
