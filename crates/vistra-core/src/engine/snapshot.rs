use crate::core::codec::{CodecError, ContentCodec};
use crate::core::models::ids::NodeId;
use crate::core::models::node::{PayloadSlot, TreeNode};
use crate::core::models::tree::ProjectTree;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A self-contained, serializable value copy of a subtree.
///
/// Snapshots carry payloads as serialized bytes, never live references, so
/// they survive arbitrary later edits to the source tree and can cross
/// document boundaries. Node 0 is the subtree root; `children` are indices
/// into `nodes`, in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtreeSnapshot {
    pub(crate) nodes: Vec<SnapshotNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SnapshotNode {
    pub name: String,
    pub is_group: bool,
    pub locked: bool,
    pub payload: Option<Vec<u8>>,
    pub children: Vec<usize>,
}

impl SubtreeSnapshot {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Display name of the snapshot root.
    pub fn root_name(&self) -> Option<&str> {
        self.nodes.first().map(|n| n.name.as_str())
    }
}

/// Payload capture taken at submission time, encoded later on a worker.
#[derive(Debug, Clone)]
pub(crate) enum PlanPayload<R> {
    None,
    /// Serialized bytes were already at hand; no codec work needed.
    Raw(Vec<u8>),
    /// A dirty or bytes-less representation; the worker encodes the clone.
    Repr(R),
}

#[derive(Debug, Clone)]
pub(crate) struct PlanNode<R> {
    pub name: String,
    pub is_group: bool,
    pub locked: bool,
    pub payload: PlanPayload<R>,
    pub children: Vec<usize>,
}

/// The immutable capture handed to the snapshot pool: everything a worker
/// needs to produce a [`SubtreeSnapshot`] without touching the tree again.
#[derive(Debug, Clone)]
pub(crate) struct SnapshotPlan<R> {
    pub nodes: Vec<PlanNode<R>>,
}

/// Captures a value copy of the subtree rooted at `root`, in pre-order.
///
/// Clean payloads with resident bytes are captured as bytes; dirty or
/// bytes-less representations are cloned and encoded off the primary
/// context later.
pub(crate) fn plan_subtree<R: Clone>(tree: &ProjectTree<R>, root: NodeId) -> SnapshotPlan<R> {
    let mut nodes = Vec::new();
    capture(tree, root, &mut nodes);
    SnapshotPlan { nodes }
}

fn capture<R: Clone>(tree: &ProjectTree<R>, id: NodeId, out: &mut Vec<PlanNode<R>>) -> usize {
    let node = tree.node(id).expect("planned subtree nodes are resident");
    let payload = match node.payload() {
        None => PlanPayload::None,
        Some(slot) => {
            if !slot.is_dirty() {
                if let Some(raw) = slot.raw() {
                    PlanPayload::Raw(raw.to_vec())
                } else if let Some(repr) = slot.repr() {
                    PlanPayload::Repr(repr.clone())
                } else {
                    warn!(name = node.display_name(), "leaf with no content captured empty");
                    PlanPayload::None
                }
            } else if let Some(repr) = slot.repr() {
                PlanPayload::Repr(repr.clone())
            } else {
                PlanPayload::None
            }
        }
    };
    let index = out.len();
    out.push(PlanNode {
        name: node.display_name().to_string(),
        is_group: node.is_group(),
        locked: node.is_locked(),
        payload,
        children: Vec::new(),
    });
    for &child in tree.node(id).expect("resident").children() {
        let child_index = capture(tree, child, out);
        out[index].children.push(child_index);
    }
    index
}

/// Worker-side encode of a plan into a finished snapshot. Fails on the
/// first payload the codec cannot serialize.
pub(crate) fn encode_plan<R>(
    plan: &SnapshotPlan<R>,
    codec: &dyn ContentCodec<R>,
) -> Result<SubtreeSnapshot, CodecError> {
    let mut nodes = Vec::with_capacity(plan.nodes.len());
    for node in &plan.nodes {
        let payload = match &node.payload {
            PlanPayload::None => None,
            PlanPayload::Raw(bytes) => Some(bytes.clone()),
            PlanPayload::Repr(repr) => Some(codec.encode(repr)?),
        };
        nodes.push(SnapshotNode {
            name: node.name.clone(),
            is_group: node.is_group,
            locked: node.locked,
            payload,
            children: node.children.clone(),
        });
    }
    Ok(SubtreeSnapshot { nodes })
}

/// Materializes a snapshot as a detached subtree with fresh stable ids.
///
/// Leaf payloads come back as unloaded byte slots and materialize lazily on
/// demand. The returned root is detached; the caller links it in.
///
/// # Return
///
/// `None` for an empty snapshot.
pub(crate) fn rebuild_subtree<R>(
    tree: &mut ProjectTree<R>,
    snapshot: &SubtreeSnapshot,
) -> Option<NodeId> {
    if snapshot.nodes.is_empty() {
        return None;
    }
    Some(rebuild(tree, snapshot, 0))
}

fn rebuild<R>(tree: &mut ProjectTree<R>, snapshot: &SubtreeSnapshot, index: usize) -> NodeId {
    let source = &snapshot.nodes[index];
    let node = if source.is_group {
        let mut group: TreeNode<R> = TreeNode::group(&source.name);
        group.set_locked(source.locked);
        group
    } else {
        TreeNode::leaf(
            &source.name,
            PayloadSlot::unloaded(source.payload.clone(), false),
        )
    };
    let id = tree.insert_detached(node);
    for &child_index in &source.children {
        let child = rebuild(tree, snapshot, child_index);
        let position = tree
            .node(id)
            .map(|n| n.children().len())
            .unwrap_or_default();
        tree.attach(child, id, position);
    }
    id
}
