//! # Engine Module
//!
//! This module implements the stateful mutation core of the document model:
//! every structural edit, its undo record, the selection bookkeeping, lazy
//! payload materialization, and the background task pipeline.
//!
//! ## Architecture
//!
//! - **Mutation** ([`mutator`]) - The [`mutator::TreeMutator`], the only
//!   component allowed to add, remove, or move nodes; every primitive pairs
//!   the edit with its inverse command.
//! - **Undo/Redo** ([`undo`]) - Command-object undo log with transactional
//!   grouping.
//! - **Selection** ([`selection`]) - Primary node plus multi-selection set,
//!   kept consistent with tree mutations.
//! - **Lazy Loading** ([`lazy`]) - The unloaded/loading/loaded/error state
//!   machine that materializes payloads on demand.
//! - **Background Tasks** ([`pipeline`]) - Bounded worker pools, structured
//!   cancellation, and completion marshaling back to the primary context.
//! - **Snapshots** ([`snapshot`]) - Immutable value-copies of subtrees used
//!   by copy/paste and cross-document transfer.
//! - **Configuration** ([`config`]) - Engine tuning knobs with validation.
//! - **Events** ([`events`]) - Change notifications for a presentation
//!   layer, free of any view knowledge.
//! - **Error Handling** ([`error`]) - Engine-specific error taxonomy.
//!
//! ## Threading Model
//!
//! The node graph, undo log, and selection model have exactly one writer:
//! the primary context that owns the document. Background tasks only read
//! immutable snapshots captured at submission time and post completions to
//! a channel the primary context drains.

pub mod config;
pub mod error;
pub mod events;
pub mod lazy;
pub mod mutator;
pub mod pipeline;
pub mod selection;
pub mod snapshot;
pub mod undo;
