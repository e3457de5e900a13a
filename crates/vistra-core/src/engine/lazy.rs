use super::error::EngineError;
use crate::core::codec::CodecError;
use crate::core::models::ids::NodeId;
use crate::core::models::node::LazyStatus;
use crate::core::models::tree::ProjectTree;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Outcome of a load request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadRequest {
    /// A decode should be scheduled for these bytes. The generation must be
    /// echoed back on completion so a cancelled load cannot land.
    Scheduled { generation: u64, bytes: Vec<u8> },
    /// A decode for this node is already in flight; nothing to schedule.
    InFlight,
    /// The payload is already materialized.
    AlreadyLoaded,
}

/// Drives the payload materialization state machine.
///
/// Legal transitions: `Unloaded -> Loading -> {Loaded | Error}`, with
/// `Error -> Loading` on retry and `Loaded -> Unloaded` only through
/// [`unwrap_payload`](Self::unwrap_payload). Decoding itself happens
/// elsewhere; the loader hands out the bytes and a generation, and accepts
/// completions only while both still match.
#[derive(Debug, Default)]
pub struct LazyLoader {
    pending: HashMap<NodeId, u64>,
}

impl LazyLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a decode for `node` is currently in flight.
    pub fn is_pending(&self, node: NodeId) -> bool {
        self.pending.contains_key(&node)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Requests materialization of a leaf's payload.
    ///
    /// Valid from `Unloaded` and `Error` (retry). Idempotent while a load
    /// is in flight: a second call schedules nothing and reports
    /// [`LoadRequest::InFlight`], so exactly one decode runs per node.
    pub fn begin_load<R>(
        &mut self,
        tree: &mut ProjectTree<R>,
        node: NodeId,
    ) -> Result<LoadRequest, EngineError> {
        let n = tree.node_mut(node).ok_or(EngineError::NotFound { node })?;
        let Some(slot) = n.payload_mut() else {
            return Err(EngineError::NotALeaf { node });
        };
        match slot.status {
            LazyStatus::Loaded => Ok(LoadRequest::AlreadyLoaded),
            LazyStatus::Loading => Ok(LoadRequest::InFlight),
            LazyStatus::Unloaded | LazyStatus::Error => {
                let Some(bytes) = slot.raw.clone() else {
                    return Err(EngineError::MissingPayload { node });
                };
                slot.generation += 1;
                slot.status = LazyStatus::Loading;
                slot.load_error = None;
                self.pending.insert(node, slot.generation);
                debug!(?node, generation = slot.generation, "load scheduled");
                Ok(LoadRequest::Scheduled {
                    generation: slot.generation,
                    bytes,
                })
            }
        }
    }

    /// Applies the result of a decode that was scheduled by `begin_load`.
    ///
    /// Accepted only while the slot is still `Loading` with the same
    /// generation; completions arriving after a cancel or a newer request
    /// are dropped silently. A decode failure parks the slot in `Error`,
    /// keeping the raw bytes for a retry.
    ///
    /// # Return
    ///
    /// `true` if the completion was applied.
    pub fn complete_load<R>(
        &mut self,
        tree: &mut ProjectTree<R>,
        node: NodeId,
        generation: u64,
        result: Result<R, CodecError>,
    ) -> bool {
        let Some(slot) = tree.node_mut(node).and_then(|n| n.payload_mut()) else {
            debug!(?node, "load completion for a purged node dropped");
            self.pending.remove(&node);
            return false;
        };
        if slot.status != LazyStatus::Loading || slot.generation != generation {
            debug!(?node, generation, current = slot.generation, "stale load completion dropped");
            return false;
        }
        self.pending.remove(&node);
        match result {
            Ok(repr) => {
                slot.repr = Some(repr);
                slot.status = LazyStatus::Loaded;
                slot.load_error = None;
            }
            Err(err) => {
                warn!(?node, error = %err, "payload decode failed");
                slot.repr = None;
                slot.status = LazyStatus::Error;
                slot.load_error = Some(err.to_string());
            }
        }
        true
    }

    /// Abandons an in-flight load, returning the slot to `Unloaded`.
    ///
    /// The generation bump makes the outstanding worker result stale; no
    /// completion for the cancelled request can land afterwards. A node
    /// that is not loading is left untouched.
    pub fn cancel_load<R>(&mut self, tree: &mut ProjectTree<R>, node: NodeId) {
        self.pending.remove(&node);
        let Some(slot) = tree.node_mut(node).and_then(|n| n.payload_mut()) else {
            return;
        };
        if slot.status == LazyStatus::Loading {
            slot.generation += 1;
            slot.status = LazyStatus::Unloaded;
            debug!(?node, "load cancelled");
        }
    }

    /// Drops a clean, materialized representation to reclaim memory,
    /// keeping the serialized bytes so the payload can be reloaded.
    ///
    /// Fails with `DirtyPayload` if unsaved edits would be lost, with
    /// `NotLoaded` if there is nothing to drop.
    pub fn unwrap_payload<R>(
        &mut self,
        tree: &mut ProjectTree<R>,
        node: NodeId,
    ) -> Result<(), EngineError> {
        let n = tree.node_mut(node).ok_or(EngineError::NotFound { node })?;
        let Some(slot) = n.payload_mut() else {
            return Err(EngineError::NotALeaf { node });
        };
        if slot.status != LazyStatus::Loaded {
            return Err(EngineError::NotLoaded { node });
        }
        if slot.dirty {
            return Err(EngineError::DirtyPayload { node });
        }
        if slot.raw.is_none() {
            return Err(EngineError::MissingPayload { node });
        }
        slot.repr = None;
        slot.status = LazyStatus::Unloaded;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::CodecError;
    use crate::core::models::node::{PayloadSlot, TreeNode};

    fn tree_with_cold_leaf(bytes: &[u8]) -> (ProjectTree<String>, NodeId) {
        let mut tree: ProjectTree<String> = ProjectTree::new();
        let root = tree.root();
        let leaf = tree.insert_detached(TreeNode::leaf(
            "leaf",
            PayloadSlot::unloaded(Some(bytes.to_vec()), true),
        ));
        tree.attach(leaf, root, 0);
        (tree, leaf)
    }

    fn status(tree: &ProjectTree<String>, node: NodeId) -> LazyStatus {
        tree.node(node).unwrap().status()
    }

    #[test]
    fn begin_load_is_idempotent_while_in_flight() {
        let (mut tree, leaf) = tree_with_cold_leaf(b"hello");
        let mut loader = LazyLoader::new();

        let first = loader.begin_load(&mut tree, leaf).unwrap();
        let LoadRequest::Scheduled { generation, bytes } = first else {
            panic!("expected a scheduled decode");
        };
        assert_eq!(bytes, b"hello");
        assert_eq!(status(&tree, leaf), LazyStatus::Loading);

        // Only the first request schedules a decode.
        assert_eq!(loader.begin_load(&mut tree, leaf).unwrap(), LoadRequest::InFlight);
        assert_eq!(loader.pending_count(), 1);

        assert!(loader.complete_load(&mut tree, leaf, generation, Ok("hello".into())));
        assert_eq!(status(&tree, leaf), LazyStatus::Loaded);
        assert_eq!(
            tree.node(leaf).unwrap().payload().unwrap().repr(),
            Some(&"hello".to_string())
        );
        assert_eq!(
            loader.begin_load(&mut tree, leaf).unwrap(),
            LoadRequest::AlreadyLoaded
        );
    }

    #[test]
    fn completion_after_cancel_is_dropped() {
        let (mut tree, leaf) = tree_with_cold_leaf(b"data");
        let mut loader = LazyLoader::new();

        let LoadRequest::Scheduled { generation, .. } =
            loader.begin_load(&mut tree, leaf).unwrap()
        else {
            panic!("expected a scheduled decode");
        };
        loader.cancel_load(&mut tree, leaf);
        assert_eq!(status(&tree, leaf), LazyStatus::Unloaded);
        assert!(!loader.is_pending(leaf));

        assert!(!loader.complete_load(&mut tree, leaf, generation, Ok("late".into())));
        assert_eq!(status(&tree, leaf), LazyStatus::Unloaded);
        assert!(tree.node(leaf).unwrap().payload().unwrap().repr().is_none());
    }

    #[test]
    fn retry_supersedes_the_previous_generation() {
        let (mut tree, leaf) = tree_with_cold_leaf(b"data");
        let mut loader = LazyLoader::new();

        let LoadRequest::Scheduled { generation: g1, .. } =
            loader.begin_load(&mut tree, leaf).unwrap()
        else {
            panic!("expected a scheduled decode");
        };
        loader.cancel_load(&mut tree, leaf);
        let LoadRequest::Scheduled { generation: g2, .. } =
            loader.begin_load(&mut tree, leaf).unwrap()
        else {
            panic!("expected a scheduled decode");
        };
        assert_ne!(g1, g2);

        // The first worker finishes after the second request was issued.
        assert!(!loader.complete_load(&mut tree, leaf, g1, Ok("old".into())));
        assert!(loader.complete_load(&mut tree, leaf, g2, Ok("new".into())));
        assert_eq!(
            tree.node(leaf).unwrap().payload().unwrap().repr(),
            Some(&"new".to_string())
        );
    }

    #[test]
    fn decode_failure_parks_in_error_and_allows_retry() {
        let (mut tree, leaf) = tree_with_cold_leaf(b"garbled");
        let mut loader = LazyLoader::new();

        let LoadRequest::Scheduled { generation, .. } =
            loader.begin_load(&mut tree, leaf).unwrap()
        else {
            panic!("expected a scheduled decode");
        };
        assert!(loader.complete_load(
            &mut tree,
            leaf,
            generation,
            Err(CodecError::malformed("bad header")),
        ));
        assert_eq!(status(&tree, leaf), LazyStatus::Error);
        let slot = tree.node(leaf).unwrap().payload().unwrap();
        assert_eq!(slot.load_error(), Some("malformed content payload: bad header"));
        assert_eq!(slot.raw(), Some(&b"garbled"[..]), "bytes kept for retry");

        // Error is a valid start state for another attempt.
        let retry = loader.begin_load(&mut tree, leaf).unwrap();
        assert!(matches!(retry, LoadRequest::Scheduled { .. }));
        assert_eq!(status(&tree, leaf), LazyStatus::Loading);
    }

    #[test]
    fn begin_load_without_bytes_is_missing_payload() {
        let mut tree: ProjectTree<String> = ProjectTree::new();
        let root = tree.root();
        let leaf = tree.insert_detached(TreeNode::leaf("empty", PayloadSlot::unloaded(None, false)));
        tree.attach(leaf, root, 0);

        let mut loader = LazyLoader::new();
        assert_eq!(
            loader.begin_load(&mut tree, leaf),
            Err(EngineError::MissingPayload { node: leaf })
        );
        assert_eq!(
            loader.begin_load(&mut tree, root),
            Err(EngineError::NotALeaf { node: root })
        );
    }

    #[test]
    fn unwrap_payload_drops_repr_but_keeps_bytes() {
        let (mut tree, leaf) = tree_with_cold_leaf(b"bytes");
        let mut loader = LazyLoader::new();
        let LoadRequest::Scheduled { generation, .. } =
            loader.begin_load(&mut tree, leaf).unwrap()
        else {
            panic!("expected a scheduled decode");
        };
        loader.complete_load(&mut tree, leaf, generation, Ok("bytes".into()));

        loader.unwrap_payload(&mut tree, leaf).unwrap();
        let slot = tree.node(leaf).unwrap().payload().unwrap();
        assert_eq!(slot.status(), LazyStatus::Unloaded);
        assert!(slot.repr().is_none());
        assert_eq!(slot.raw(), Some(&b"bytes"[..]));

        assert_eq!(
            loader.unwrap_payload(&mut tree, leaf),
            Err(EngineError::NotLoaded { node: leaf })
        );
    }

    #[test]
    fn unwrap_payload_refuses_dirty_slots() {
        let mut tree: ProjectTree<String> = ProjectTree::new();
        let root = tree.root();
        let leaf = tree.insert_detached(TreeNode::leaf(
            "edited",
            PayloadSlot::loaded("v2".to_string(), None),
        ));
        tree.attach(leaf, root, 0);
        {
            let slot = tree.node_mut(leaf).unwrap().payload_mut().unwrap();
            slot.dirty = true;
        }

        let mut loader = LazyLoader::new();
        assert_eq!(
            loader.unwrap_payload(&mut tree, leaf),
            Err(EngineError::DirtyPayload { node: leaf })
        );
    }
}
