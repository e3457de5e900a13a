use super::ids::{NodeId, StableId};
use super::node::{NodeKind, TreeNode};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Represents the complete project hierarchy of one document.
///
/// This struct is the central data structure of the document model. Nodes
/// are stored in a slot-map arena and addressed by [`NodeId`]; parent links
/// are plain arena handles, never owning references, so no reference cycles
/// can form. A node detached from its parent stays resident in the arena
/// (the undo log may still reference it) until it is explicitly purged.
#[derive(Debug, Clone)]
pub struct ProjectTree<R> {
    /// Primary storage for nodes using a slot map for efficient ID management.
    nodes: SlotMap<NodeId, TreeNode<R>>,
    /// The hidden root group; always present, never detached.
    root: NodeId,
    /// Lookup map from persistent stable id to runtime arena handle.
    stable_index: HashMap<StableId, NodeId>,
}

impl<R> Default for ProjectTree<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ProjectTree<R> {
    /// Creates a new tree containing only the hidden root group.
    pub fn new() -> Self {
        Self::with_root(TreeNode::group("root"))
    }

    /// Creates a tree around a caller-supplied root group, used when
    /// reconstructing a document from an archive skeleton.
    pub(crate) fn with_root(root_node: TreeNode<R>) -> Self {
        debug_assert!(root_node.is_group());
        let mut nodes = SlotMap::with_key();
        let stable = root_node.stable_id().clone();
        let root = nodes.insert(root_node);
        let mut stable_index = HashMap::new();
        stable_index.insert(stable, root);
        Self {
            nodes,
            root,
            stable_index,
        }
    }

    /// The id of the hidden root group.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Retrieves an immutable reference to a node by its ID.
    ///
    /// # Return
    ///
    /// Returns `Some(&TreeNode)` if the node exists, otherwise `None`.
    pub fn node(&self, id: NodeId) -> Option<&TreeNode<R>> {
        self.nodes.get(id)
    }

    /// Retrieves a mutable reference to a node by its ID.
    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut TreeNode<R>> {
        self.nodes.get_mut(id)
    }

    /// Whether `id` refers to a live arena node (attached or detached).
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Whether `id` is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == self.root {
                return true;
            }
            current = self.nodes.get(c).and_then(|n| n.parent);
        }
        false
    }

    /// Resolves a persistent stable id to its runtime handle.
    pub fn lookup(&self, stable: &StableId) -> Option<NodeId> {
        self.stable_index.get(stable).copied()
    }

    /// Adds a node to the arena without attaching it to any parent.
    ///
    /// # Return
    ///
    /// The arena handle of the new node.
    pub(crate) fn insert_detached(&mut self, node: TreeNode<R>) -> NodeId {
        let stable = node.stable_id().clone();
        let id = self.nodes.insert(node);
        self.stable_index.insert(stable, id);
        id
    }

    /// Links a detached node under `parent` at `index`.
    ///
    /// `index` is clamped to the parent's current child count. Callers are
    /// responsible for lock and cycle validation; this is pure bookkeeping.
    pub(crate) fn attach(&mut self, node: NodeId, parent: NodeId, index: usize) {
        debug_assert!(self.nodes[node].parent.is_none());
        let siblings = &mut self.nodes[parent].children;
        let index = index.min(siblings.len());
        siblings.insert(index, node);
        self.nodes[node].parent = Some(parent);
    }

    /// Unlinks a node from its parent, keeping it resident in the arena.
    ///
    /// # Return
    ///
    /// The former `(parent, index)` position, or `None` if the node is the
    /// root, already detached, or not present at all.
    pub(crate) fn detach(&mut self, node: NodeId) -> Option<(NodeId, usize)> {
        if node == self.root {
            return None;
        }
        let parent = self.nodes.get(node)?.parent?;
        let index = self.index_of_child(parent, node)?;
        self.nodes[parent].children.remove(index);
        self.nodes[node].parent = None;
        Some((parent, index))
    }

    /// Permanently removes a detached subtree from the arena.
    ///
    /// Attached nodes and the root are left untouched.
    pub(crate) fn purge(&mut self, node: NodeId) {
        if node == self.root || !self.nodes.contains_key(node) {
            return;
        }
        if self.nodes[node].parent.is_some() {
            return;
        }
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(n) = self.nodes.remove(id) {
                self.stable_index.remove(n.stable_id());
                stack.extend(n.children().iter().copied());
            }
        }
    }

    /// Removes every arena node that is no longer reachable from the root.
    ///
    /// Only safe once the undo history has been cleared; the undo log keeps
    /// detached nodes alive so they can be re-linked.
    pub(crate) fn purge_detached(&mut self) {
        let detached: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(id, n)| *id != self.root && n.parent.is_none())
            .map(|(id, _)| id)
            .collect();
        for id in detached {
            self.purge(id);
        }
    }

    /// Position of `child` within `parent`'s ordered child list.
    pub fn index_of_child(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.nodes
            .get(parent)?
            .children
            .iter()
            .position(|&c| c == child)
    }

    /// Whether `node` lies strictly below `ancestor`.
    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.nodes.get(node).and_then(|n| n.parent);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.nodes.get(c).and_then(|n| n.parent);
        }
        false
    }

    /// Whether `node` or any of its ancestors locks structural edits.
    pub fn is_lock_protected(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(c) = current {
            let Some(n) = self.nodes.get(c) else {
                return false;
            };
            if n.is_locked() {
                return true;
            }
            current = n.parent;
        }
        false
    }

    /// All attached nodes in depth-first pre-order, root excluded.
    pub fn flattened_nodes(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk(self.root, &mut |id| {
            if id != self.root {
                out.push(id);
            }
        });
        out
    }

    /// All attached leaf nodes in depth-first pre-order.
    pub fn flattened_leaf_nodes(&self) -> Vec<NodeId> {
        self.flattened_nodes()
            .into_iter()
            .filter(|&id| self.nodes[id].is_leaf())
            .collect()
    }

    /// All attached group nodes in depth-first pre-order, root excluded.
    pub fn flattened_group_nodes(&self) -> Vec<NodeId> {
        self.flattened_nodes()
            .into_iter()
            .filter(|&id| self.nodes[id].is_group())
            .collect()
    }

    /// Display names from the root (exclusive) down to `node` (inclusive).
    pub fn path_names(&self, node: NodeId) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = Some(node);
        while let Some(c) = current {
            if c == self.root {
                break;
            }
            let Some(n) = self.nodes.get(c) else { break };
            names.push(n.display_name().to_string());
            current = n.parent;
        }
        names.reverse();
        names
    }

    /// Reduces a set of nodes to the roots of its connected subtrees: the
    /// members that have no ancestor in the set, in pre-order.
    pub fn local_roots(&self, set: &std::collections::HashSet<NodeId>) -> Vec<NodeId> {
        self.flattened_nodes()
            .into_iter()
            .filter(|id| set.contains(id))
            .filter(|&id| !set.iter().any(|&other| self.is_descendant_of(id, other)))
            .collect()
    }

    /// All node ids inside the subtree rooted at `node`, `node` included.
    pub fn subtree_ids(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if self.nodes.contains_key(node) {
            self.walk(node, &mut |id| out.push(id));
        }
        out
    }

    fn walk(&self, node: NodeId, f: &mut impl FnMut(NodeId)) {
        f(node);
        let children = self.nodes[node].children.clone();
        for child in children {
            self.walk(child, f);
        }
    }

    /// Extracts the structural skeleton: ids, names, flags, and child
    /// ordering for every attached node, payload bytes excluded.
    pub fn skeleton(&self) -> Skeleton {
        let mut nodes = Vec::new();
        let mut order = vec![self.root];
        order.extend(self.flattened_nodes());
        for id in order {
            let n = &self.nodes[id];
            nodes.push(SkeletonNode {
                id: n.stable_id().clone(),
                name: n.display_name().to_string(),
                is_group: n.is_group(),
                locked: n.is_locked(),
                editable: n.is_editable(),
                children: n
                    .children()
                    .iter()
                    .map(|&c| self.nodes[c].stable_id().clone())
                    .collect(),
            });
        }
        Skeleton {
            root: self.nodes[self.root].stable_id().clone(),
            nodes,
        }
    }

    /// Order-sensitive hash of the structural skeleton, used to verify that
    /// failed mutations leave the tree untouched.
    pub fn structural_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.skeleton().hash(&mut hasher);
        hasher.finish()
    }
}

/// Serializable structural view of a tree: ids, names, flags, and ordered
/// child-id lists. Never embeds payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Skeleton {
    pub root: StableId,
    pub nodes: Vec<SkeletonNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkeletonNode {
    pub id: StableId,
    pub name: String,
    pub is_group: bool,
    pub locked: bool,
    pub editable: bool,
    pub children: Vec<StableId>,
}

impl<R> NodeKind<R> {
    /// Whether this kind can carry children.
    pub fn is_group(&self) -> bool {
        matches!(self, NodeKind::Group { .. })
    }
}
