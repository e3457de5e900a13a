use crate::core::codec::ContentCodec;
use crate::core::io::ArchiveError;
use crate::core::models::ids::NodeId;
use crate::core::models::node::{LazyStatus, PayloadSlot, TreeNode};
use crate::core::models::tree::ProjectTree;
use crate::core::tables::AuxTables;
use crate::core::io::archive;
use crate::engine::config::EngineConfig;
use crate::engine::error::EngineError;
use crate::engine::events::ChangeKind;
use crate::engine::lazy::{LazyLoader, LoadRequest};
use crate::engine::mutator::TreeMutator;
use crate::engine::pipeline::{Completion, Pipeline, TaskClass};
use crate::engine::snapshot::{plan_subtree, rebuild_subtree, SubtreeSnapshot};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("document has no backing path; save it with an explicit path first")]
    NoPath,

    #[error("nothing to paste, the clipboard is empty")]
    EmptyClipboard,
}

/// User-visible outcome of a drained background completion.
#[derive(Debug)]
pub enum DocumentEvent {
    LoadFinished {
        node: NodeId,
    },
    LoadFailed {
        node: NodeId,
        reason: String,
    },
    Imported {
        node: NodeId,
    },
    /// The decode failed; when `node` is set, the content was still
    /// inserted in the error state with its bytes intact for a retry.
    ImportFailed {
        name: String,
        reason: String,
        node: Option<NodeId>,
    },
    CopyReady {
        count: usize,
    },
    TransferReady {
        snapshots: Vec<SubtreeSnapshot>,
    },
    SnapshotFailed {
        class: TaskClass,
        reason: String,
    },
    Cancelled {
        class: TaskClass,
    },
}

/// Drain-side bookkeeping for the current import operation. Completions
/// arrive in decode-finish order, so the base index alone cannot place an
/// item; each landed node is recorded by submission sequence and later
/// items slot in relative to it.
struct ImportBatch {
    index: usize,
    landed: BTreeMap<usize, NodeId>,
}

/// An editing session over one project archive.
///
/// Owns the tree (through its mutator), the lazy loader, and the background
/// pipeline. All mutation happens on the caller's context; background
/// workers only decode and encode byte captures, and their completions are
/// applied here via [`drain_completions`](Self::drain_completions).
pub struct Document<R, C> {
    mutator: TreeMutator<R>,
    loader: LazyLoader,
    pipeline: Pipeline<R>,
    codec: Arc<C>,
    tables: AuxTables,
    path: Option<PathBuf>,
    clipboard: Option<Vec<SubtreeSnapshot>>,
    import_batch: Option<ImportBatch>,
}

impl<R, C> Document<R, C>
where
    R: Clone + Send + 'static,
    C: ContentCodec<R> + 'static,
{
    /// Creates an empty, unsaved document.
    pub fn new(codec: C, config: &EngineConfig) -> Self {
        Self {
            mutator: TreeMutator::new(config),
            loader: LazyLoader::new(),
            pipeline: Pipeline::new(config),
            codec: Arc::new(codec),
            tables: AuxTables::default(),
            path: None,
            clipboard: None,
            import_batch: None,
        }
    }

    /// Opens an archive from disk. Leaf payloads come back unloaded and
    /// materialize on demand.
    #[instrument(skip(codec, config), name = "document_open")]
    pub fn open(path: &Path, codec: C, config: &EngineConfig) -> Result<Self, DocumentError> {
        let (tree, tables) = archive::load_from_path(path)?;
        info!(leaves = tree.flattened_leaf_nodes().len(), "document opened");
        Ok(Self {
            mutator: TreeMutator::with_tree(tree, config),
            loader: LazyLoader::new(),
            pipeline: Pipeline::new(config),
            codec: Arc::new(codec),
            tables,
            path: Some(path.to_path_buf()),
            clipboard: None,
            import_batch: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn tables(&self) -> &AuxTables {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut AuxTables {
        &mut self.tables
    }

    pub fn mutator(&self) -> &TreeMutator<R> {
        &self.mutator
    }

    /// Direct access to the mutation primitives (insert, remove, move,
    /// rename, selection). All of them are undoable through
    /// [`undo`](Self::undo) / [`redo`](Self::redo).
    pub fn mutator_mut(&mut self) -> &mut TreeMutator<R> {
        &mut self.mutator
    }

    pub fn tree(&self) -> &ProjectTree<R> {
        self.mutator.tree()
    }

    pub fn undo(&mut self) -> bool {
        self.mutator.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.mutator.redo()
    }

    /// Whether background work is still outstanding.
    pub fn is_busy(&self) -> bool {
        self.pipeline.is_busy()
    }

    /// Saves to the document's backing path.
    pub fn save(&mut self) -> Result<(), DocumentError> {
        let path = self.path.clone().ok_or(DocumentError::NoPath)?;
        self.save_as(&path)
    }

    /// Saves to `path` and adopts it as the backing path.
    #[instrument(skip(self), name = "document_save")]
    pub fn save_as(&mut self, path: &Path) -> Result<(), DocumentError> {
        archive::save_to_path(
            path,
            self.mutator.tree_mut(),
            &self.tables,
            self.codec.as_ref(),
        )?;
        self.path = Some(path.to_path_buf());
        info!("document saved");
        Ok(())
    }

    /// Periodic save hook. Defers while the pipeline is busy so a save
    /// never interleaves with in-flight imports or snapshots, and does
    /// nothing for a document that has never been given a path.
    ///
    /// # Return
    ///
    /// `true` if a save actually ran.
    pub fn autosave(&mut self) -> Result<bool, DocumentError> {
        if self.pipeline.is_busy() {
            debug!("autosave deferred, pipeline busy");
            return Ok(false);
        }
        if self.path.is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Requests materialization of a leaf's payload. Idempotent while a
    /// load is in flight; completion arrives via
    /// [`drain_completions`](Self::drain_completions).
    pub fn request_load(&mut self, node: NodeId) -> Result<(), DocumentError> {
        let request = self.loader.begin_load(self.mutator.tree_mut(), node)?;
        if let LoadRequest::Scheduled { generation, bytes } = request {
            self.mutator.emit(node, ChangeKind::StatusChanged);
            let codec: Arc<dyn ContentCodec<R>> = self.codec.clone();
            self.pipeline.submit_load(node, generation, bytes, codec);
        }
        Ok(())
    }

    /// Abandons an in-flight load; the worker's eventual completion is
    /// dropped as stale.
    pub fn cancel_load(&mut self, node: NodeId) {
        self.loader.cancel_load(self.mutator.tree_mut(), node);
        self.mutator.emit(node, ChangeKind::StatusChanged);
    }

    /// Drops a clean materialized payload to reclaim memory, keeping the
    /// bytes for a later reload.
    pub fn unwrap_payload(&mut self, node: NodeId) -> Result<(), DocumentError> {
        self.loader.unwrap_payload(self.mutator.tree_mut(), node)?;
        self.mutator.emit(node, ChangeKind::StatusChanged);
        Ok(())
    }

    /// Imports external content items as new leaves under `parent`,
    /// starting at `index`. Decodes run on the import pool; each item is
    /// inserted (undoably) when its completion is drained. A new import
    /// operation cancels any still-outstanding previous one.
    pub fn import(
        &mut self,
        items: Vec<(String, Vec<u8>)>,
        parent: NodeId,
        index: usize,
    ) -> Result<(), DocumentError> {
        self.validate_parent(parent)?;
        let token = self.pipeline.begin(TaskClass::Import);
        self.import_batch = Some(ImportBatch {
            index,
            landed: BTreeMap::new(),
        });
        info!(count = items.len(), "import scheduled");
        for (sequence, (name, bytes)) in items.into_iter().enumerate() {
            let codec: Arc<dyn ContentCodec<R>> = self.codec.clone();
            self.pipeline
                .submit_import(token.clone(), name, parent, sequence, bytes, codec);
        }
        Ok(())
    }

    /// Snapshots the local roots of the current selection onto the
    /// clipboard. Encoding runs on the serialized snapshot pool; the
    /// clipboard is replaced when [`DocumentEvent::CopyReady`] is drained.
    ///
    /// # Return
    ///
    /// The number of subtrees being captured.
    pub fn copy_selection(&mut self) -> usize {
        self.schedule_snapshots(TaskClass::Snapshot)
    }

    /// Like [`copy_selection`](Self::copy_selection), but the finished
    /// snapshots are handed back via [`DocumentEvent::TransferReady`] for
    /// insertion into another document.
    pub fn transfer_out(&mut self) -> usize {
        self.schedule_snapshots(TaskClass::Transfer)
    }

    fn schedule_snapshots(&mut self, class: TaskClass) -> usize {
        let roots = self.mutator.selection().local_roots(self.mutator.tree());
        let plans: Vec<_> = roots
            .iter()
            .map(|&root| plan_subtree(self.mutator.tree(), root))
            .collect();
        let count = plans.len();
        if count == 0 {
            return 0;
        }
        let token = self.pipeline.begin(class);
        let codec: Arc<dyn ContentCodec<R>> = self.codec.clone();
        self.pipeline.submit_snapshots(token, class, plans, codec);
        count
    }

    /// Pastes the clipboard under `parent` at `index` as one undo step.
    /// Every pasted node gets a fresh stable id; payloads arrive unloaded.
    pub fn paste(&mut self, parent: NodeId, index: usize) -> Result<Vec<NodeId>, DocumentError> {
        let snapshots = self.clipboard.clone().ok_or(DocumentError::EmptyClipboard)?;
        self.insert_snapshots(&snapshots, parent, index, "Paste")
    }

    /// Inserts snapshots produced by another document's
    /// [`transfer_out`](Self::transfer_out).
    pub fn transfer_in(
        &mut self,
        snapshots: &[SubtreeSnapshot],
        parent: NodeId,
        index: usize,
    ) -> Result<Vec<NodeId>, DocumentError> {
        self.insert_snapshots(snapshots, parent, index, "Transfer")
    }

    fn insert_snapshots(
        &mut self,
        snapshots: &[SubtreeSnapshot],
        parent: NodeId,
        index: usize,
        group_name: &str,
    ) -> Result<Vec<NodeId>, DocumentError> {
        self.validate_parent(parent)?;
        let mut inserted = Vec::new();
        self.mutator.begin_group(group_name);
        for (offset, snapshot) in snapshots.iter().enumerate() {
            let Some(root) = rebuild_subtree(self.mutator.tree_mut(), snapshot) else {
                continue;
            };
            self.mutator
                .attach_existing(root, parent, index.saturating_add(offset))?;
            inserted.push(root);
        }
        self.mutator.end_group();
        Ok(inserted)
    }

    /// Applies every background completion that is ready and reports the
    /// resulting events. Must be called from the owning context; this is
    /// the single point where worker results touch the tree.
    pub fn drain_completions(&mut self) -> Vec<DocumentEvent> {
        self.pipeline
            .drain()
            .into_iter()
            .filter_map(|completion| self.apply(completion))
            .collect()
    }

    /// Blocks until the next meaningful event, or returns `None` once
    /// nothing is in flight. Intended for batch tooling and tests; an
    /// interactive caller polls [`drain_completions`](Self::drain_completions)
    /// instead.
    pub fn drain_blocking(&mut self) -> Option<DocumentEvent> {
        loop {
            let completion = self.pipeline.recv_blocking()?;
            if let Some(event) = self.apply(completion) {
                return Some(event);
            }
        }
    }

    fn apply(&mut self, completion: Completion<R>) -> Option<DocumentEvent> {
        match completion {
            Completion::Load {
                node,
                generation,
                result,
            } => {
                let failure = result.as_ref().err().map(|e| e.to_string());
                let applied =
                    self.loader
                        .complete_load(self.mutator.tree_mut(), node, generation, result);
                if !applied {
                    return None;
                }
                self.mutator.emit(node, ChangeKind::StatusChanged);
                Some(match failure {
                    None => DocumentEvent::LoadFinished { node },
                    Some(reason) => DocumentEvent::LoadFailed { node, reason },
                })
            }
            Completion::Import {
                token,
                name,
                parent,
                sequence,
                bytes,
                result,
            } => {
                if token.is_cancelled() {
                    return Some(DocumentEvent::Cancelled {
                        class: TaskClass::Import,
                    });
                }
                if self.validate_parent(parent).is_err() {
                    warn!(name, "import target vanished before completion");
                    return Some(DocumentEvent::ImportFailed {
                        name,
                        reason: "target group no longer accepts children".to_string(),
                        node: None,
                    });
                }
                let index = self.import_position(parent, sequence);
                match result {
                    Ok(repr) => {
                        let node = TreeNode::leaf(&name, PayloadSlot::loaded(repr, Some(bytes)));
                        match self.mutator.insert(node, parent, index) {
                            Ok(id) => {
                                self.record_import(sequence, id);
                                Some(DocumentEvent::Imported { node: id })
                            }
                            Err(err) => Some(DocumentEvent::ImportFailed {
                                name,
                                reason: err.to_string(),
                                node: None,
                            }),
                        }
                    }
                    Err(err) => {
                        // Keep the bytes around in the error state so the
                        // user can retry the decode in place.
                        let mut slot = PayloadSlot::unloaded(Some(bytes), false);
                        slot.status = LazyStatus::Error;
                        slot.load_error = Some(err.to_string());
                        let node = TreeNode::leaf(&name, slot);
                        let inserted = self.mutator.insert(node, parent, index).ok();
                        if let Some(id) = inserted {
                            self.record_import(sequence, id);
                        }
                        Some(DocumentEvent::ImportFailed {
                            name,
                            reason: err.to_string(),
                            node: inserted,
                        })
                    }
                }
            }
            Completion::Snapshots {
                token,
                class,
                result,
            } => {
                if token.is_cancelled() {
                    return Some(DocumentEvent::Cancelled { class });
                }
                match result {
                    Ok(snapshots) => match class {
                        TaskClass::Snapshot => {
                            let count = snapshots.len();
                            self.clipboard = Some(snapshots);
                            Some(DocumentEvent::CopyReady { count })
                        }
                        TaskClass::Transfer => Some(DocumentEvent::TransferReady { snapshots }),
                        TaskClass::Import => {
                            debug_assert!(false, "imports never produce snapshots");
                            None
                        }
                    },
                    Err(err) => Some(DocumentEvent::SnapshotFailed {
                        class,
                        reason: err.to_string(),
                    }),
                }
            }
            Completion::Cancelled { class } => Some(DocumentEvent::Cancelled { class }),
        }
    }

    /// Insertion index that restores submission order for the current
    /// import operation, whatever order its completions arrive in: right
    /// after the nearest earlier-submitted item that already landed and is
    /// still under `parent`, or at the operation's base index when none
    /// has.
    fn import_position(&self, parent: NodeId, sequence: usize) -> usize {
        let Some(batch) = &self.import_batch else {
            return usize::MAX;
        };
        let tree = self.mutator.tree();
        batch
            .landed
            .range(..sequence)
            .rev()
            .find_map(|(_, &node)| tree.index_of_child(parent, node).map(|i| i + 1))
            .unwrap_or(batch.index)
    }

    fn record_import(&mut self, sequence: usize, node: NodeId) {
        if let Some(batch) = &mut self.import_batch {
            batch.landed.insert(sequence, node);
        }
    }

    fn validate_parent(&self, parent: NodeId) -> Result<(), EngineError> {
        let tree = self.mutator.tree();
        let node = tree
            .node(parent)
            .filter(|_| tree.is_attached(parent))
            .ok_or(EngineError::NotFound { node: parent })?;
        if !node.is_group() {
            return Err(EngineError::NotAGroup { node: parent });
        }
        if tree.is_lock_protected(parent) {
            return Err(EngineError::LockedParent { node: parent });
        }
        Ok(())
    }
}
