//! Background execution of decode and snapshot work.
//!
//! Workers only ever see immutable byte captures taken at submission time;
//! every result is posted to a completion channel and applied to the tree
//! by the primary context. The tree itself is never shared across threads.

mod cancel;
mod pool;

pub use cancel::CancellationToken;

use self::pool::WorkerPool;
use super::config::{EngineConfig, SNAPSHOT_CONCURRENCY};
use super::snapshot::{encode_plan, SnapshotPlan, SubtreeSnapshot};
use crate::core::codec::{CodecError, ContentCodec};
use crate::core::models::ids::NodeId;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use tracing::debug;

/// Long-running operation families. Issuing a new operation of a class
/// cancels every outstanding task of the same class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
    Import,
    Snapshot,
    Transfer,
}

/// A finished background task, drained and applied on the primary context.
#[derive(Debug)]
pub enum Completion<R> {
    /// A payload decode requested by the lazy loader.
    Load {
        node: NodeId,
        generation: u64,
        result: Result<R, CodecError>,
    },
    /// An external-content decode destined for insertion as a new leaf.
    /// `sequence` is the item's position within its operation; completions
    /// arrive in decode-finish order, so the drain side uses it to restore
    /// submission order. The original bytes ride along so a failed decode
    /// can still be inserted in the error state and retried later.
    Import {
        token: CancellationToken,
        name: String,
        parent: NodeId,
        sequence: usize,
        bytes: Vec<u8>,
        result: Result<R, CodecError>,
    },
    /// The encoded snapshots of one copy or transfer operation, in
    /// submission order.
    Snapshots {
        token: CancellationToken,
        class: TaskClass,
        result: Result<Vec<SubtreeSnapshot>, CodecError>,
    },
    /// A task observed its cancellation token and wound down.
    Cancelled { class: TaskClass },
}

/// Owns the worker pools and the completion channel.
///
/// One pool handles imports and lazy decodes concurrently; a single-worker
/// pool serializes snapshot encodes so their order is deterministic. The
/// pipeline tracks tasks in flight from submission until their completion
/// is drained, which is what autosave consults before deferring.
pub struct Pipeline<R> {
    imports: WorkerPool,
    snapshots: WorkerPool,
    tx: Sender<Completion<R>>,
    rx: Receiver<Completion<R>>,
    tokens: HashMap<TaskClass, CancellationToken>,
    in_flight: usize,
}

impl<R: Send + 'static> Pipeline<R> {
    pub fn new(config: &EngineConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            imports: WorkerPool::new("vistra-import", config.import_concurrency),
            snapshots: WorkerPool::new("vistra-snapshot", SNAPSHOT_CONCURRENCY),
            tx,
            rx,
            tokens: HashMap::new(),
            in_flight: 0,
        }
    }

    /// Starts a new operation of `class`, cancelling every task the
    /// previous operation of that class still has outstanding.
    pub fn begin(&mut self, class: TaskClass) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self.tokens.insert(class, token.clone()) {
            previous.cancel();
            debug!(?class, "superseded previous operation");
        }
        token
    }

    /// Whether any submitted task has not yet been drained.
    pub fn is_busy(&self) -> bool {
        self.in_flight > 0
    }

    /// Schedules a payload decode for the lazy loader. Staleness is handled
    /// by the generation check on the apply side, not by cancellation.
    pub fn submit_load(
        &mut self,
        node: NodeId,
        generation: u64,
        bytes: Vec<u8>,
        codec: Arc<dyn ContentCodec<R>>,
    ) {
        self.in_flight += 1;
        let tx = self.tx.clone();
        self.imports.execute(move || {
            let result = codec.decode(&bytes);
            let _ = tx.send(Completion::Load {
                node,
                generation,
                result,
            });
        });
    }

    /// Schedules decode of external bytes for insertion under `parent`.
    pub fn submit_import(
        &mut self,
        token: CancellationToken,
        name: String,
        parent: NodeId,
        sequence: usize,
        bytes: Vec<u8>,
        codec: Arc<dyn ContentCodec<R>>,
    ) {
        self.in_flight += 1;
        let tx = self.tx.clone();
        self.imports.execute(move || {
            if token.is_cancelled() {
                let _ = tx.send(Completion::Cancelled {
                    class: TaskClass::Import,
                });
                return;
            }
            let result = codec.decode(&bytes);
            if token.is_cancelled() {
                let _ = tx.send(Completion::Cancelled {
                    class: TaskClass::Import,
                });
                return;
            }
            let _ = tx.send(Completion::Import {
                token,
                name,
                parent,
                sequence,
                bytes,
                result,
            });
        });
    }

    /// Schedules the encode of one copy or transfer operation's plans on
    /// the serialized snapshot pool.
    pub(crate) fn submit_snapshots(
        &mut self,
        token: CancellationToken,
        class: TaskClass,
        plans: Vec<SnapshotPlan<R>>,
        codec: Arc<dyn ContentCodec<R>>,
    ) {
        self.in_flight += 1;
        let tx = self.tx.clone();
        self.snapshots.execute(move || {
            if token.is_cancelled() {
                let _ = tx.send(Completion::Cancelled { class });
                return;
            }
            let result = plans
                .iter()
                .map(|plan| encode_plan(plan, codec.as_ref()))
                .collect::<Result<Vec<_>, _>>();
            if token.is_cancelled() {
                let _ = tx.send(Completion::Cancelled { class });
                return;
            }
            let _ = tx.send(Completion::Snapshots {
                token,
                class,
                result,
            });
        });
    }

    /// Collects every completion that is ready, without blocking.
    pub fn drain(&mut self) -> Vec<Completion<R>> {
        let drained: Vec<_> = self.rx.try_iter().collect();
        self.in_flight = self.in_flight.saturating_sub(drained.len());
        drained
    }

    /// Blocks for the next completion, or returns `None` when nothing is
    /// in flight.
    pub fn recv_blocking(&mut self) -> Option<Completion<R>> {
        if self.in_flight == 0 {
            return None;
        }
        let completion = self.rx.recv().ok()?;
        self.in_flight -= 1;
        Some(completion)
    }
}
