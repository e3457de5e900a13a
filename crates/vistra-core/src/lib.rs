//! # Vistra Core Library
//!
//! The project-tree persistence and mutation engine behind the Vistra
//! scientific-visualization document model: a hierarchical document whose
//! nodes may be lazily materialized from an archive, whose every structural
//! mutation is undoable, and whose on-disk representation is a multi-entry
//! binary container with independent per-node payloads.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a
//! clear separation of concerns, making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Contains stateless data models
//!   (`ProjectTree`, `TreeNode`), the opaque content-codec seam, auxiliary
//!   tables, and the archive container I/O.
//!
//! - **[`engine`]: The Logic Core.** This stateful layer orchestrates all
//!   document mutation. It includes the `TreeMutator` (the only component
//!   allowed to restructure the tree), the command-based `UndoLog`, the
//!   `SelectionModel`, the `LazyLoader` state machine, and the cancellable
//!   `Pipeline` of background tasks.
//!
//! - **[`workflows`]: The Public API.** This is the highest-level,
//!   user-facing layer. It ties the `engine` and `core` together into a
//!   [`workflows::document::Document`] that a presentation layer drives
//!   through simple open/edit/save/import operations.

pub mod core;
pub mod engine;
pub mod workflows;
