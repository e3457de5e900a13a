use crate::core::models::ids::NodeId;
use crate::core::models::tree::ProjectTree;
use std::collections::HashSet;

/// The primary selected node plus the multi-selection set.
///
/// Selection tracks identity, not position: moving a node keeps it
/// selected, removing it from the tree removes it from the selection in
/// the same transaction. The primary node, when present, is always a
/// member of the selected set.
#[derive(Debug, Default)]
pub struct SelectionModel {
    primary: Option<NodeId>,
    selected: HashSet<NodeId>,
}

/// Value snapshot of a selection, stored in undo commands so selection
/// changes participate in undo groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionState {
    pub primary: Option<NodeId>,
    pub selected: Vec<NodeId>,
}

impl SelectionModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn primary(&self) -> Option<NodeId> {
        self.primary
    }

    pub fn selected(&self) -> &HashSet<NodeId> {
        &self.selected
    }

    pub fn is_selected(&self, node: NodeId) -> bool {
        self.selected.contains(&node)
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Members of the selection that are direct children of `parent`, in
    /// child order, so sibling-scoped selection semantics survive moves.
    pub fn selected_under<R>(&self, tree: &ProjectTree<R>, parent: NodeId) -> Vec<NodeId> {
        tree.node(parent)
            .map(|n| {
                n.children()
                    .iter()
                    .copied()
                    .filter(|c| self.selected.contains(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Roots of the selected subtrees: selected nodes with no selected
    /// ancestor, in pre-order. This is the unit of copy and transfer.
    pub fn local_roots<R>(&self, tree: &ProjectTree<R>) -> Vec<NodeId> {
        tree.local_roots(&self.selected)
    }

    /// Captures the current selection as an ordered value snapshot.
    pub fn snapshot(&self) -> SelectionState {
        let mut selected: Vec<NodeId> = self.selected.iter().copied().collect();
        selected.sort();
        SelectionState {
            primary: self.primary,
            selected,
        }
    }

    /// Restores a previously captured snapshot.
    pub(crate) fn restore(&mut self, state: &SelectionState) {
        self.primary = state.primary;
        self.selected = state.selected.iter().copied().collect();
        if let Some(p) = self.primary {
            self.selected.insert(p);
        }
    }

    /// Replaces the selection outright. The primary, when given, is forced
    /// into the selected set to uphold the membership invariant.
    pub(crate) fn set(&mut self, primary: Option<NodeId>, selected: impl IntoIterator<Item = NodeId>) {
        self.selected = selected.into_iter().collect();
        if let Some(p) = primary {
            self.selected.insert(p);
        }
        self.primary = primary;
    }

    /// Drops every selection entry that refers to a node in `removed`.
    ///
    /// # Return
    ///
    /// `true` if the selection changed.
    pub(crate) fn drop_nodes(&mut self, removed: &HashSet<NodeId>) -> bool {
        let before = self.selected.len();
        self.selected.retain(|n| !removed.contains(n));
        let mut changed = self.selected.len() != before;
        if let Some(p) = self.primary {
            if removed.contains(&p) {
                self.primary = None;
                changed = true;
            }
        }
        changed
    }
}
