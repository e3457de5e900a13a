use super::config::EngineConfig;
use super::error::EngineError;
use super::events::{ChangeKind, ChangeNotifier, TreeObserver};
use super::selection::SelectionModel;
use super::undo::{Command, UndoGroup, UndoLog};
use crate::core::models::ids::NodeId;
use crate::core::models::node::TreeNode;
use crate::core::models::tree::ProjectTree;
use std::collections::HashSet;
use tracing::debug;

/// The only component allowed to restructure the project tree.
///
/// Every primitive validates first, then mutates, then records the inverse
/// command; an error means nothing changed and nothing was logged. The
/// selection model is resynchronized inside the same undo group as the
/// mutation that affected it.
pub struct TreeMutator<R> {
    tree: ProjectTree<R>,
    undo: UndoLog<R>,
    selection: SelectionModel,
    notifier: ChangeNotifier,
    prune_empty_groups: bool,
}

impl<R> TreeMutator<R> {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_tree(ProjectTree::new(), config)
    }

    pub fn with_tree(tree: ProjectTree<R>, config: &EngineConfig) -> Self {
        Self {
            tree,
            undo: UndoLog::new(config.undo_limit),
            selection: SelectionModel::new(),
            notifier: ChangeNotifier::new(),
            prune_empty_groups: config.prune_empty_groups,
        }
    }

    pub fn tree(&self) -> &ProjectTree<R> {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut ProjectTree<R> {
        &mut self.tree
    }

    pub fn selection(&self) -> &SelectionModel {
        &self.selection
    }

    pub fn undo_log(&self) -> &UndoLog<R> {
        &self.undo
    }

    /// Registers a change observer; callbacks fire on the primary context.
    pub fn observe(&mut self, observer: TreeObserver) {
        self.notifier.subscribe(observer);
    }

    pub(crate) fn emit(&self, node: NodeId, kind: ChangeKind) {
        self.notifier.notify(node, kind);
    }

    /// Brackets the following primitives into one user-visible undo step.
    pub fn begin_group(&mut self, name: &str) {
        self.undo.begin_group(name);
    }

    pub fn end_group(&mut self) {
        self.undo.end_group();
        self.purge_overflow();
    }

    /// Inserts a detached node as `parent`'s child at `index`.
    ///
    /// `index` is clamped to `[0, child_count]`. Fails with `LockedParent`
    /// if `parent` or an ancestor is locked, `NotFound`/`NotAGroup` if
    /// `parent` cannot hold children.
    ///
    /// # Return
    ///
    /// The arena handle of the inserted node.
    pub fn insert(
        &mut self,
        node: TreeNode<R>,
        parent: NodeId,
        index: usize,
    ) -> Result<NodeId, EngineError> {
        self.validate_target(parent)?;
        let id = self.tree.insert_detached(node);
        self.tree.attach(id, parent, index);
        self.undo.push("Insert", Command::Remove { node: id });
        self.purge_overflow();
        self.notifier.notify(id, ChangeKind::Inserted);
        Ok(id)
    }

    /// Re-links an already resident, currently detached node (e.g. a subtree
    /// rebuilt from a snapshot) under `parent`.
    pub(crate) fn attach_existing(
        &mut self,
        node: NodeId,
        parent: NodeId,
        index: usize,
    ) -> Result<(), EngineError> {
        if !self.tree.contains(node) {
            return Err(EngineError::NotFound { node });
        }
        debug_assert!(
            self.tree.node(node).and_then(|n| n.parent()).is_none(),
            "attach_existing expects a detached node"
        );
        self.validate_target(parent)?;
        if parent == node || self.tree.is_descendant_of(parent, node) {
            return Err(EngineError::WouldCycle { node });
        }
        self.tree.attach(node, parent, index);
        self.undo.push("Insert", Command::Remove { node });
        self.purge_overflow();
        self.notifier.notify(node, ChangeKind::Inserted);
        Ok(())
    }

    /// Detaches `node` from its parent, dropping it (and any selected
    /// descendants) from the selection in the same undo group.
    ///
    /// The subtree stays resident in the arena so undo can re-link the very
    /// same handles.
    pub fn remove(&mut self, node: NodeId) -> Result<(), EngineError> {
        let n = self.tree.node(node).ok_or(EngineError::NotFound { node })?;
        let parent = n.parent().ok_or(EngineError::NotFound { node })?;
        if self.tree.is_lock_protected(parent) {
            return Err(EngineError::LockedParent { node });
        }

        self.undo.begin_group("Remove");
        self.drop_selection_in_subtree(node);
        let (old_parent, old_index) = self
            .tree
            .detach(node)
            .expect("validated attached non-root node");
        self.undo.push(
            "Remove",
            Command::Insert {
                node,
                parent: old_parent,
                index: old_index,
            },
        );
        self.undo.end_group();
        self.purge_overflow();
        self.notifier.notify(node, ChangeKind::Removed);
        Ok(())
    }

    /// Moves `node` under `new_parent` at `new_index`, recorded as a single
    /// grouped undo entry.
    ///
    /// When reordering within the same parent, a target index past the
    /// node's current position is decremented by one before inserting,
    /// because the removal shifts later siblings left.
    pub fn move_node(
        &mut self,
        node: NodeId,
        new_parent: NodeId,
        new_index: usize,
    ) -> Result<(), EngineError> {
        let n = self.tree.node(node).ok_or(EngineError::NotFound { node })?;
        let old_parent = n.parent().ok_or(EngineError::NotFound { node })?;
        if self.tree.is_lock_protected(old_parent) {
            return Err(EngineError::LockedParent { node });
        }
        self.validate_target(new_parent)?;
        if new_parent == node || self.tree.is_descendant_of(new_parent, node) {
            return Err(EngineError::WouldCycle { node });
        }
        let old_index = self
            .tree
            .index_of_child(old_parent, node)
            .expect("attached node is listed in its parent");

        self.undo.begin_group("Move");
        self.tree.detach(node).expect("validated attached node");
        let mut index = new_index;
        if new_parent == old_parent && new_index > old_index {
            index -= 1;
        }
        self.tree.attach(node, new_parent, index);
        self.undo.push(
            "Move",
            Command::Insert {
                node,
                parent: old_parent,
                index: old_index,
            },
        );
        self.undo.push("Move", Command::Remove { node });
        self.prune_if_emptied(old_parent, new_parent);
        self.undo.end_group();
        self.purge_overflow();
        self.notifier.notify(node, ChangeKind::Moved);
        Ok(())
    }

    fn prune_if_emptied(&mut self, old_parent: NodeId, new_parent: NodeId) {
        if !self.prune_empty_groups || old_parent == new_parent || old_parent == self.tree.root() {
            return;
        }
        let emptied = self
            .tree
            .node(old_parent)
            .map(|p| p.is_group() && p.children().is_empty())
            .unwrap_or(false);
        if !emptied {
            return;
        }
        self.drop_selection_in_subtree(old_parent);
        let (grandparent, slot) = self
            .tree
            .detach(old_parent)
            .expect("emptied group is attached and not the root");
        self.undo.push(
            "Move",
            Command::Insert {
                node: old_parent,
                parent: grandparent,
                index: slot,
            },
        );
        debug!(group = ?old_parent, "pruned group emptied by move");
        self.notifier.notify(old_parent, ChangeKind::Removed);
    }

    /// Undoable display-name change. Fails with `LockedParent` if the node
    /// declines edits.
    pub fn rename(&mut self, node: NodeId, name: impl Into<String>) -> Result<(), EngineError> {
        let name = name.into();
        let n = self
            .tree
            .node_mut(node)
            .ok_or(EngineError::NotFound { node })?;
        if !n.is_editable() {
            return Err(EngineError::LockedParent { node });
        }
        if n.display_name == name {
            return Ok(());
        }
        let old = std::mem::replace(&mut n.display_name, name);
        self.undo.push("Rename", Command::Rename { node, name: old });
        self.purge_overflow();
        self.notifier.notify(node, ChangeKind::Renamed);
        Ok(())
    }

    /// Swaps a leaf's decoded payload, marking it dirty and invalidating
    /// its serialized bytes until the next save. The previous payload is
    /// captured by value, so later edits cannot corrupt the undo record.
    pub fn replace_payload(&mut self, node: NodeId, new_repr: R) -> Result<(), EngineError> {
        let n = self
            .tree
            .node_mut(node)
            .ok_or(EngineError::NotFound { node })?;
        let Some(slot) = n.payload_mut() else {
            return Err(EngineError::NotALeaf { node });
        };
        if slot.repr.is_none() {
            return Err(EngineError::NotLoaded { node });
        }
        let old = slot.repr.replace(new_repr);
        slot.dirty = true;
        slot.raw = None;
        self.undo.push("Edit", Command::SetPayload { node, repr: old });
        self.purge_overflow();
        self.notifier.notify(node, ChangeKind::PayloadReplaced);
        Ok(())
    }

    /// Replaces the selection, routed through the undo log so selection
    /// changes group with the action that caused them.
    pub fn set_selection(
        &mut self,
        primary: Option<NodeId>,
        selected: Vec<NodeId>,
    ) -> Result<(), EngineError> {
        for &id in selected.iter().chain(primary.iter()) {
            if !self.tree.is_attached(id) {
                return Err(EngineError::NotFound { node: id });
            }
        }
        let old = self.selection.snapshot();
        self.selection.set(primary, selected);
        if self.selection.snapshot() == old {
            return Ok(());
        }
        self.undo
            .push("Selection", Command::SetSelection { state: old });
        self.purge_overflow();
        self.notifier
            .notify(primary.unwrap_or_else(|| self.tree.root()), ChangeKind::SelectionChanged);
        Ok(())
    }

    /// Locks or unlocks a group's children against structural edits, e.g.
    /// for the duration of a drag. Not undoable; lock state is transient.
    pub fn set_locked(&mut self, node: NodeId, locked: bool) -> Result<(), EngineError> {
        let n = self
            .tree
            .node_mut(node)
            .ok_or(EngineError::NotFound { node })?;
        if !n.is_group() {
            return Err(EngineError::NotAGroup { node });
        }
        n.set_locked(locked);
        self.notifier.notify(node, ChangeKind::StatusChanged);
        Ok(())
    }

    /// Reverts the most recent undo group.
    ///
    /// # Return
    ///
    /// `false` if there was nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(group) = self.undo.take_undo() else {
            return false;
        };
        debug!(step = %group.name, "undo");
        let mut inverse = UndoGroup::new(group.name.clone());
        for command in group.commands.into_iter().rev() {
            let inv = self.apply(command);
            inverse.commands.push(inv);
        }
        self.undo.push_redo(inverse);
        true
    }

    /// Re-applies the most recently undone group.
    pub fn redo(&mut self) -> bool {
        let Some(group) = self.undo.take_redo() else {
            return false;
        };
        debug!(step = %group.name, "redo");
        let mut inverse = UndoGroup::new(group.name.clone());
        for command in group.commands.into_iter().rev() {
            let inv = self.apply(command);
            inverse.commands.push(inv);
        }
        self.undo.push_undo_preserving_redo(inverse);
        true
    }

    /// Drops the undo history and frees every arena node that is no longer
    /// reachable from the root.
    pub fn clear_history(&mut self) {
        self.undo.clear();
        self.tree.purge_detached();
    }

    /// Executes a logged command against the tree, returning its inverse.
    ///
    /// Commands only ever reference arena nodes the retained history keeps
    /// alive, so lookups here are infallible by construction.
    fn apply(&mut self, command: Command<R>) -> Command<R> {
        match command {
            Command::Insert {
                node,
                parent,
                index,
            } => {
                self.tree.attach(node, parent, index);
                self.notifier.notify(node, ChangeKind::Inserted);
                Command::Remove { node }
            }
            Command::Remove { node } => {
                let (parent, index) = self
                    .tree
                    .detach(node)
                    .expect("logged command references an attached node");
                self.notifier.notify(node, ChangeKind::Removed);
                Command::Insert {
                    node,
                    parent,
                    index,
                }
            }
            Command::Rename { node, name } => {
                let n = self
                    .tree
                    .node_mut(node)
                    .expect("logged command references a live node");
                let old = std::mem::replace(&mut n.display_name, name);
                self.notifier.notify(node, ChangeKind::Renamed);
                Command::Rename { node, name: old }
            }
            Command::SetPayload { node, repr } => {
                let slot = self
                    .tree
                    .node_mut(node)
                    .and_then(|n| n.payload_mut())
                    .expect("logged command references a live leaf");
                let old = std::mem::replace(&mut slot.repr, repr);
                slot.dirty = true;
                slot.raw = None;
                self.notifier.notify(node, ChangeKind::PayloadReplaced);
                Command::SetPayload { node, repr: old }
            }
            Command::SetSelection { state } => {
                let old = self.selection.snapshot();
                self.selection.restore(&state);
                self.notifier.notify(
                    state.primary.unwrap_or_else(|| self.tree.root()),
                    ChangeKind::SelectionChanged,
                );
                Command::SetSelection { state: old }
            }
        }
    }

    fn validate_target(&self, parent: NodeId) -> Result<(), EngineError> {
        let p = self
            .tree
            .node(parent)
            .ok_or(EngineError::NotFound { node: parent })?;
        if !p.is_group() {
            return Err(EngineError::NotAGroup { node: parent });
        }
        if self.tree.is_lock_protected(parent) {
            return Err(EngineError::LockedParent { node: parent });
        }
        Ok(())
    }

    fn drop_selection_in_subtree(&mut self, node: NodeId) {
        let subtree: HashSet<NodeId> = self.tree.subtree_ids(node).into_iter().collect();
        let old = self.selection.snapshot();
        if self.selection.drop_nodes(&subtree) {
            self.undo
                .push("Selection", Command::SetSelection { state: old });
            self.notifier
                .notify(node, ChangeKind::SelectionChanged);
        }
    }

    fn purge_overflow(&mut self) {
        let evicted = self.undo.drain_overflow();
        if evicted.is_empty() {
            return;
        }
        let live = self.undo.referenced_nodes();
        for group in evicted {
            for node in group.inserted_nodes().collect::<Vec<_>>() {
                if self.tree.contains(node) && !self.tree.is_attached(node) && !live.contains(&node)
                {
                    self.tree.purge(node);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::node::PayloadSlot;

    type Mutator = TreeMutator<String>;

    fn mutator() -> Mutator {
        TreeMutator::new(&EngineConfig::default())
    }

    fn leaf(name: &str) -> TreeNode<String> {
        TreeNode::leaf(name, PayloadSlot::loaded(name.to_string(), None))
    }

    fn child_names(m: &Mutator, parent: NodeId) -> Vec<String> {
        m.tree()
            .node(parent)
            .unwrap()
            .children()
            .iter()
            .map(|&c| m.tree().node(c).unwrap().display_name().to_string())
            .collect()
    }

    mod insert {
        use super::*;

        #[test]
        fn insert_places_node_at_clamped_index() {
            let mut m = mutator();
            let root = m.tree().root();
            let a = m.insert(leaf("a"), root, 0).unwrap();
            let _b = m.insert(leaf("b"), root, 99).unwrap();
            assert_eq!(child_names(&m, root), vec!["a", "b"]);
            assert_eq!(m.tree().node(a).unwrap().parent(), Some(root));
        }

        #[test]
        fn insert_into_leaf_fails() {
            let mut m = mutator();
            let root = m.tree().root();
            let a = m.insert(leaf("a"), root, 0).unwrap();
            let err = m.insert(leaf("b"), a, 0).unwrap_err();
            assert_eq!(err, EngineError::NotAGroup { node: a });
        }

        #[test]
        fn insert_under_locked_group_fails_without_state_change() {
            let mut m = mutator();
            let root = m.tree().root();
            let g = m.insert(TreeNode::group("g"), root, 0).unwrap();
            m.set_locked(g, true).unwrap();

            let before = m.tree().structural_hash();
            let err = m.insert(leaf("a"), g, 0).unwrap_err();
            assert_eq!(err, EngineError::LockedParent { node: g });
            assert_eq!(m.tree().structural_hash(), before);
        }

        #[test]
        fn lock_protection_extends_to_nested_targets() {
            let mut m = mutator();
            let root = m.tree().root();
            let outer = m.insert(TreeNode::group("outer"), root, 0).unwrap();
            let inner = m.insert(TreeNode::group("inner"), outer, 0).unwrap();
            m.set_locked(outer, true).unwrap();
            let err = m.insert(leaf("a"), inner, 0).unwrap_err();
            assert_eq!(err, EngineError::LockedParent { node: inner });
        }

        #[test]
        fn failed_insert_logs_nothing() {
            let mut m = mutator();
            let root = m.tree().root();
            let a = m.insert(leaf("a"), root, 0).unwrap();
            assert!(m.undo_log().can_undo());
            let mut m = mutator();
            let _ = m.insert(leaf("x"), a, 0); // `a` belongs to the other tree
            assert!(!m.undo_log().can_undo());
        }
    }

    mod remove {
        use super::*;

        #[test]
        fn remove_detaches_and_undo_restores_position() {
            let mut m = mutator();
            let root = m.tree().root();
            let _a = m.insert(leaf("a"), root, 0).unwrap();
            let b = m.insert(leaf("b"), root, 1).unwrap();
            let _c = m.insert(leaf("c"), root, 2).unwrap();

            m.remove(b).unwrap();
            assert_eq!(child_names(&m, root), vec!["a", "c"]);
            assert!(m.tree().contains(b), "removed node stays resident");

            assert!(m.undo());
            assert_eq!(child_names(&m, root), vec!["a", "b", "c"]);
            assert!(m.redo());
            assert_eq!(child_names(&m, root), vec!["a", "c"]);
        }

        #[test]
        fn remove_of_detached_or_root_is_not_found() {
            let mut m = mutator();
            let root = m.tree().root();
            let a = m.insert(leaf("a"), root, 0).unwrap();
            m.remove(a).unwrap();
            assert_eq!(m.remove(a), Err(EngineError::NotFound { node: a }));
            assert_eq!(m.remove(root), Err(EngineError::NotFound { node: root }));
        }

        #[test]
        fn remove_under_locked_parent_fails_without_state_change() {
            let mut m = mutator();
            let root = m.tree().root();
            let g = m.insert(TreeNode::group("g"), root, 0).unwrap();
            let a = m.insert(leaf("a"), g, 0).unwrap();
            m.set_locked(g, true).unwrap();

            let before = m.tree().structural_hash();
            assert_eq!(m.remove(a), Err(EngineError::LockedParent { node: a }));
            assert_eq!(m.tree().structural_hash(), before);
        }

        #[test]
        fn removing_selected_node_drops_it_from_selection_in_same_group() {
            let mut m = mutator();
            let root = m.tree().root();
            let a = m.insert(leaf("a"), root, 0).unwrap();
            let b = m.insert(leaf("b"), root, 1).unwrap();
            m.begin_group("Select");
            m.set_selection(Some(a), vec![a, b]).unwrap();
            m.end_group();

            m.remove(a).unwrap();
            assert_eq!(m.selection().primary(), None);
            assert!(!m.selection().is_selected(a));
            assert!(m.selection().is_selected(b));

            // One undo restores both the node and the selection.
            assert!(m.undo());
            assert_eq!(m.selection().primary(), Some(a));
            assert!(m.selection().is_selected(a));
        }
    }

    mod move_node {
        use super::*;

        #[test]
        fn same_parent_index_correction_holds_for_all_pairs() {
            for i in 0..4usize {
                for j in 0..4usize {
                    if i == j {
                        continue;
                    }
                    let mut m = mutator();
                    let root = m.tree().root();
                    let leaves: Vec<NodeId> = (0..4)
                        .map(|k| m.insert(leaf(&format!("n{k}")), root, k).unwrap())
                        .collect();

                    m.move_node(leaves[i], root, j).unwrap();
                    let expected = if j > i { j - 1 } else { j };
                    assert_eq!(
                        m.tree().index_of_child(root, leaves[i]),
                        Some(expected),
                        "moving index {i} to {j}"
                    );

                    assert!(m.undo());
                    assert_eq!(
                        child_names(&m, root),
                        vec!["n0", "n1", "n2", "n3"],
                        "undo after moving {i} to {j}"
                    );
                }
            }
        }

        #[test]
        fn cross_parent_move_round_trips_through_undo_redo() {
            let mut m = mutator();
            let root = m.tree().root();
            let g1 = m.insert(TreeNode::group("g1"), root, 0).unwrap();
            let g2 = m.insert(TreeNode::group("g2"), root, 1).unwrap();
            let a = m.insert(leaf("a"), g1, 0).unwrap();
            let _b = m.insert(leaf("b"), g1, 1).unwrap();

            let before = m.tree().skeleton();
            m.move_node(a, g2, 0).unwrap();
            let after = m.tree().skeleton();
            assert_ne!(before, after);

            assert!(m.undo());
            assert_eq!(m.tree().skeleton(), before);
            assert!(m.redo());
            assert_eq!(m.tree().skeleton(), after);
        }

        #[test]
        fn move_into_own_subtree_is_rejected() {
            let mut m = mutator();
            let root = m.tree().root();
            let g = m.insert(TreeNode::group("g"), root, 0).unwrap();
            let inner = m.insert(TreeNode::group("inner"), g, 0).unwrap();
            assert_eq!(m.move_node(g, inner, 0), Err(EngineError::WouldCycle { node: g }));
            assert_eq!(m.move_node(g, g, 0), Err(EngineError::WouldCycle { node: g }));
        }

        #[test]
        fn cross_parent_move_prunes_emptied_group() {
            let mut m = mutator();
            let root = m.tree().root();
            let g1 = m.insert(TreeNode::group("g1"), root, 0).unwrap();
            let g2 = m.insert(TreeNode::group("g2"), root, 1).unwrap();
            let a = m.insert(leaf("a"), g1, 0).unwrap();

            m.move_node(a, g2, 0).unwrap();
            assert!(!m.tree().is_attached(g1), "emptied group is pruned");
            assert_eq!(child_names(&m, root), vec!["g2"]);

            // The prune undoes together with the move.
            assert!(m.undo());
            assert!(m.tree().is_attached(g1));
            assert_eq!(child_names(&m, g1), vec!["a"]);
        }

        #[test]
        fn prune_can_be_disabled() {
            let config = EngineConfig::builder()
                .prune_empty_groups(false)
                .build()
                .unwrap();
            let mut m: Mutator = TreeMutator::new(&config);
            let root = m.tree().root();
            let g1 = m.insert(TreeNode::group("g1"), root, 0).unwrap();
            let g2 = m.insert(TreeNode::group("g2"), root, 1).unwrap();
            let a = m.insert(leaf("a"), g1, 0).unwrap();

            m.move_node(a, g2, 0).unwrap();
            assert!(m.tree().is_attached(g1));
            assert!(m.tree().node(g1).unwrap().children().is_empty());
        }
    }

    mod undo_redo {
        use super::*;

        #[test]
        fn grouped_operations_undo_atomically() {
            let mut m = mutator();
            let root = m.tree().root();
            let before = m.tree().skeleton();

            m.begin_group("Build scene");
            let g = m.insert(TreeNode::group("g"), root, 0).unwrap();
            m.insert(leaf("a"), g, 0).unwrap();
            m.insert(leaf("b"), g, 1).unwrap();
            m.end_group();
            let after = m.tree().skeleton();

            assert!(m.undo());
            assert_eq!(m.tree().skeleton(), before);
            assert!(m.redo());
            assert_eq!(m.tree().skeleton(), after);
            assert!(m.undo());
            assert_eq!(m.tree().skeleton(), before);
        }

        #[test]
        fn scenario_group_insert_insert_move_with_four_undos() {
            let mut m = mutator();
            let root = m.tree().root();

            let g = m.insert(TreeNode::group("G"), root, 0).unwrap();
            let a = m.insert(leaf("A"), g, 0).unwrap();
            let _b = m.insert(leaf("B"), g, 0).unwrap();
            assert_eq!(child_names(&m, g), vec!["B", "A"]);

            m.move_node(a, g, 0).unwrap();
            assert_eq!(child_names(&m, g), vec!["A", "B"]);

            assert!(m.undo());
            assert_eq!(child_names(&m, g), vec!["B", "A"]);

            assert!(m.undo());
            assert_eq!(child_names(&m, g), vec!["A"]);

            assert!(m.undo());
            assert!(child_names(&m, g).is_empty());

            assert!(m.undo());
            assert!(!m.tree().is_attached(g));
            assert!(child_names(&m, root).is_empty());

            assert!(!m.undo());
        }

        #[test]
        fn rename_round_trips() {
            let mut m = mutator();
            let root = m.tree().root();
            let a = m.insert(leaf("old"), root, 0).unwrap();
            m.rename(a, "new").unwrap();
            assert_eq!(m.tree().node(a).unwrap().display_name(), "new");
            assert!(m.undo());
            assert_eq!(m.tree().node(a).unwrap().display_name(), "old");
            assert!(m.redo());
            assert_eq!(m.tree().node(a).unwrap().display_name(), "new");
        }

        #[test]
        fn rename_to_same_name_is_a_no_op() {
            let mut m = mutator();
            let root = m.tree().root();
            let a = m.insert(leaf("same"), root, 0).unwrap();
            let undo_name = m.undo_log().undo_name().map(str::to_string);
            m.rename(a, "same").unwrap();
            assert_eq!(m.undo_log().undo_name().map(str::to_string), undo_name);
        }

        #[test]
        fn replace_payload_captures_previous_value() {
            let mut m = mutator();
            let root = m.tree().root();
            let a = m.insert(leaf("v1"), root, 0).unwrap();

            m.replace_payload(a, "v2".to_string()).unwrap();
            m.replace_payload(a, "v3".to_string()).unwrap();
            let slot = m.tree().node(a).unwrap().payload().unwrap();
            assert_eq!(slot.repr(), Some(&"v3".to_string()));
            assert!(slot.is_dirty());
            assert!(slot.raw().is_none(), "edit invalidates serialized bytes");

            assert!(m.undo());
            assert_eq!(
                m.tree().node(a).unwrap().payload().unwrap().repr(),
                Some(&"v2".to_string())
            );
            assert!(m.undo());
            assert_eq!(
                m.tree().node(a).unwrap().payload().unwrap().repr(),
                Some(&"v1".to_string())
            );
        }

        #[test]
        fn replace_payload_on_group_or_unloaded_leaf_fails() {
            let mut m = mutator();
            let root = m.tree().root();
            let g = m.insert(TreeNode::group("g"), root, 0).unwrap();
            assert_eq!(
                m.replace_payload(g, "x".into()),
                Err(EngineError::NotALeaf { node: g })
            );

            let cold = m
                .insert(
                    TreeNode::leaf("cold", PayloadSlot::unloaded(Some(vec![1]), true)),
                    root,
                    1,
                )
                .unwrap();
            assert_eq!(
                m.replace_payload(cold, "x".into()),
                Err(EngineError::NotLoaded { node: cold })
            );
        }

        #[test]
        fn selection_changes_are_undoable() {
            let mut m = mutator();
            let root = m.tree().root();
            let a = m.insert(leaf("a"), root, 0).unwrap();
            let b = m.insert(leaf("b"), root, 1).unwrap();

            m.set_selection(Some(a), vec![a]).unwrap();
            m.set_selection(Some(b), vec![a, b]).unwrap();
            assert_eq!(m.selection().primary(), Some(b));

            assert!(m.undo());
            assert_eq!(m.selection().primary(), Some(a));
            assert!(!m.selection().is_selected(b));

            assert!(m.redo());
            assert_eq!(m.selection().primary(), Some(b));
            assert!(m.selection().is_selected(a));
        }

        #[test]
        fn selection_of_unattached_node_is_rejected() {
            let mut m = mutator();
            let root = m.tree().root();
            let a = m.insert(leaf("a"), root, 0).unwrap();
            m.remove(a).unwrap();
            assert_eq!(
                m.set_selection(Some(a), vec![a]),
                Err(EngineError::NotFound { node: a })
            );
        }
    }

    mod history {
        use super::*;

        #[test]
        fn bounded_history_purges_unreachable_nodes() {
            let config = EngineConfig::builder().undo_limit(Some(1)).build().unwrap();
            let mut m: Mutator = TreeMutator::new(&config);
            let root = m.tree().root();

            let a = m.insert(leaf("a"), root, 0).unwrap();
            m.remove(a).unwrap();
            assert!(m.tree().contains(a), "history still references the node");

            // Committing another group evicts the removal record.
            m.insert(leaf("b"), root, 0).unwrap();
            assert!(!m.tree().contains(a), "evicted history releases the node");
        }

        #[test]
        fn clear_history_purges_detached_nodes() {
            let mut m = mutator();
            let root = m.tree().root();
            let a = m.insert(leaf("a"), root, 0).unwrap();
            m.remove(a).unwrap();
            assert!(m.tree().contains(a));

            m.clear_history();
            assert!(!m.tree().contains(a));
            assert!(!m.undo_log().can_undo());
            assert!(!m.undo());
        }

        #[test]
        fn observers_see_structural_changes() {
            use std::sync::{Arc, Mutex};
            let mut m = mutator();
            let root = m.tree().root();
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            m.observe(Box::new(move |node, kind| {
                sink.lock().unwrap().push((node, kind));
            }));

            let a = m.insert(leaf("a"), root, 0).unwrap();
            m.rename(a, "renamed").unwrap();
            m.remove(a).unwrap();

            let seen = seen.lock().unwrap();
            assert_eq!(seen[0], (a, ChangeKind::Inserted));
            assert_eq!(seen[1], (a, ChangeKind::Renamed));
            assert_eq!(*seen.last().unwrap(), (a, ChangeKind::Removed));
        }
    }
}
