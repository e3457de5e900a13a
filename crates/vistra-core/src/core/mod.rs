//! # Core Module
//!
//! This module provides the fundamental building blocks of the Vistra
//! document model: the project-tree data structures, the opaque content
//! codec seam, auxiliary lookup tables, and archive I/O.
//!
//! ## Architecture
//!
//! - **Tree Representation** ([`models`]) - Arena-backed nodes, stable
//!   identifiers, and the structural skeleton view.
//! - **Content Codec** ([`codec`]) - The opaque encode/decode seam between
//!   the engine and domain payloads.
//! - **Auxiliary Tables** ([`tables`]) - Color and forcefield lookup tables
//!   carried alongside the tree in the archive.
//! - **Archive I/O** ([`io`]) - The multi-entry binary container and the
//!   document read/write paths built on top of it.

pub mod codec;
pub mod io;
pub mod models;
pub mod tables;
