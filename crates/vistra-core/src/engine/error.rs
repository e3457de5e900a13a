use crate::core::models::ids::NodeId;
use thiserror::Error;

/// Structural errors reported synchronously by mutation primitives.
///
/// Every variant leaves the tree, undo log, and selection untouched; a
/// failed primitive is indistinguishable from one that was never called.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("structural edit rejected: {node:?} is locked or inside a locked group")]
    LockedParent { node: NodeId },

    #[error("node {node:?} was not found where expected")]
    NotFound { node: NodeId },

    #[error("node {node:?} cannot be moved into its own subtree")]
    WouldCycle { node: NodeId },

    #[error("node {node:?} is not a group and cannot hold children")]
    NotAGroup { node: NodeId },

    #[error("node {node:?} is not a leaf and holds no payload")]
    NotALeaf { node: NodeId },

    #[error("node {node:?} has no payload representation loaded")]
    NotLoaded { node: NodeId },

    #[error("node {node:?} has no serialized payload bytes to materialize")]
    MissingPayload { node: NodeId },

    #[error("node {node:?} has unsaved payload edits")]
    DirtyPayload { node: NodeId },
}
