//! # Core Models Module
//!
//! Data structures representing the project hierarchy: addressable nodes,
//! their identifiers, and the arena-backed tree that owns them.
//!
//! ## Key Components
//!
//! - [`ids`] - Runtime ([`ids::NodeId`]) and persistent ([`ids::StableId`])
//!   identifier types.
//! - [`node`] - Individual tree nodes, the group/leaf sum type, and the
//!   lazily materialized payload slot.
//! - [`tree`] - The [`tree::ProjectTree`] arena with structural queries and
//!   the serializable [`tree::Skeleton`] view.

pub mod ids;
pub mod node;
pub mod tree;
