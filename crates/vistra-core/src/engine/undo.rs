use super::selection::SelectionState;
use crate::core::models::ids::NodeId;
use std::collections::HashSet;

/// A serializable inverse operation recorded for every mutation.
///
/// Commands are plain values: no closures, no captured references, so an
/// entry deep in the history can never dangle or observe later edits.
#[derive(Debug)]
pub(crate) enum Command<R> {
    /// Re-link a detached arena node under `parent` at `index`.
    Insert {
        node: NodeId,
        parent: NodeId,
        index: usize,
    },
    /// Detach `node` from its parent, keeping it resident in the arena.
    Remove { node: NodeId },
    /// Restore a display name.
    Rename { node: NodeId, name: String },
    /// Restore a payload representation, captured by value.
    SetPayload { node: NodeId, repr: Option<R> },
    /// Restore a selection snapshot.
    SetSelection { state: SelectionState },
}

/// One user-visible undo step: a named, transactionally-bracketed sequence
/// of inverse commands, executed in reverse on undo.
#[derive(Debug)]
pub(crate) struct UndoGroup<R> {
    pub name: String,
    pub commands: Vec<Command<R>>,
}

impl<R> UndoGroup<R> {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commands: Vec::new(),
        }
    }

    /// Nodes this group would re-link if executed; they must stay resident
    /// in the arena for as long as the group is retained.
    pub(crate) fn inserted_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.commands.iter().filter_map(|c| match c {
            Command::Insert { node, .. } => Some(*node),
            _ => None,
        })
    }
}

/// Records inverse operations for every structural mutation and supports
/// grouping, undo, and redo.
///
/// Nested groups flatten into the outermost group, so a compound operation
/// built from primitives still undoes atomically. Committing a new forward
/// group clears the redo stack.
pub struct UndoLog<R> {
    undo: Vec<UndoGroup<R>>,
    redo: Vec<UndoGroup<R>>,
    open: Option<UndoGroup<R>>,
    depth: usize,
    limit: Option<usize>,
    overflow: Vec<UndoGroup<R>>,
}

impl<R> UndoLog<R> {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            open: None,
            depth: 0,
            limit,
            overflow: Vec::new(),
        }
    }

    /// Opens a group; nested calls deepen the bracket without starting a
    /// new group.
    pub fn begin_group(&mut self, name: &str) {
        self.depth += 1;
        if self.open.is_none() {
            self.open = Some(UndoGroup::new(name));
        }
    }

    /// Closes the innermost bracket; the group commits when the outermost
    /// bracket closes with at least one recorded command.
    pub fn end_group(&mut self) {
        debug_assert!(self.depth > 0, "end_group without begin_group");
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            if let Some(group) = self.open.take() {
                if !group.commands.is_empty() {
                    self.commit(group);
                }
            }
        }
    }

    /// Appends an inverse command to the open group, or commits it as an
    /// implicit single-command group if none is open.
    pub(crate) fn push(&mut self, name: &str, command: Command<R>) {
        match &mut self.open {
            Some(group) => group.commands.push(command),
            None => {
                let mut group = UndoGroup::new(name);
                group.commands.push(command);
                self.commit(group);
            }
        }
    }

    fn commit(&mut self, group: UndoGroup<R>) {
        self.redo.clear();
        self.undo.push(group);
        if let Some(limit) = self.limit {
            while self.undo.len() > limit {
                self.overflow.push(self.undo.remove(0));
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Name of the next undo step, for menu titles.
    pub fn undo_name(&self) -> Option<&str> {
        self.undo.last().map(|g| g.name.as_str())
    }

    pub fn redo_name(&self) -> Option<&str> {
        self.redo.last().map(|g| g.name.as_str())
    }

    pub(crate) fn take_undo(&mut self) -> Option<UndoGroup<R>> {
        self.undo.pop()
    }

    pub(crate) fn take_redo(&mut self) -> Option<UndoGroup<R>> {
        self.redo.pop()
    }

    /// Pushes the inverse of an undone group onto the redo stack.
    pub(crate) fn push_redo(&mut self, group: UndoGroup<R>) {
        self.redo.push(group);
    }

    /// Pushes the inverse of a redone group back onto the undo stack
    /// without clearing the redo stack.
    pub(crate) fn push_undo_preserving_redo(&mut self, group: UndoGroup<R>) {
        self.undo.push(group);
    }

    /// Groups evicted by the history limit since the last call. Evicted
    /// groups may be the last reference keeping a detached node alive.
    pub(crate) fn drain_overflow(&mut self) -> Vec<UndoGroup<R>> {
        std::mem::take(&mut self.overflow)
    }

    /// Every node id that any retained group would re-link.
    pub(crate) fn referenced_nodes(&self) -> HashSet<NodeId> {
        self.undo
            .iter()
            .chain(self.redo.iter())
            .chain(self.open.iter())
            .flat_map(|g| g.inserted_nodes())
            .collect()
    }

    /// Drops the entire history.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.open = None;
        self.depth = 0;
        self.overflow.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn ids(n: usize) -> Vec<NodeId> {
        let mut keys: SlotMap<NodeId, ()> = SlotMap::with_key();
        (0..n).map(|_| keys.insert(())).collect()
    }

    fn remove_cmd(node: NodeId) -> Command<()> {
        Command::Remove { node }
    }

    #[test]
    fn implicit_groups_wrap_single_commands() {
        let ids = ids(2);
        let mut log: UndoLog<()> = UndoLog::new(None);
        log.push("Insert", remove_cmd(ids[0]));
        log.push("Insert", remove_cmd(ids[1]));
        assert!(log.can_undo());
        assert_eq!(log.undo_name(), Some("Insert"));
        assert_eq!(log.take_undo().unwrap().commands.len(), 1);
        assert_eq!(log.take_undo().unwrap().commands.len(), 1);
        assert!(!log.can_undo());
    }

    #[test]
    fn nested_groups_flatten_into_the_outermost() {
        let ids = ids(3);
        let mut log: UndoLog<()> = UndoLog::new(None);
        log.begin_group("Move 3 nodes");
        log.push("x", remove_cmd(ids[0]));
        log.begin_group("inner");
        log.push("x", remove_cmd(ids[1]));
        log.end_group();
        log.push("x", remove_cmd(ids[2]));
        log.end_group();

        let group = log.take_undo().unwrap();
        assert_eq!(group.name, "Move 3 nodes");
        assert_eq!(group.commands.len(), 3);
        assert!(!log.can_undo());
    }

    #[test]
    fn empty_groups_are_not_committed() {
        let mut log: UndoLog<()> = UndoLog::new(None);
        log.begin_group("nothing");
        log.end_group();
        assert!(!log.can_undo());
    }

    #[test]
    fn committing_clears_redo() {
        let ids = ids(2);
        let mut log: UndoLog<()> = UndoLog::new(None);
        log.push("a", remove_cmd(ids[0]));
        let undone = log.take_undo().unwrap();
        log.push_redo(undone);
        assert!(log.can_redo());

        log.push("b", remove_cmd(ids[1]));
        assert!(!log.can_redo());
    }

    #[test]
    fn limit_evicts_oldest_groups_into_overflow() {
        let ids = ids(3);
        let mut log: UndoLog<()> = UndoLog::new(Some(2));
        for &id in &ids {
            log.push("op", remove_cmd(id));
        }
        let evicted = log.drain_overflow();
        assert_eq!(evicted.len(), 1);
        assert!(log.can_undo());
        assert!(log.drain_overflow().is_empty());
    }

    #[test]
    fn referenced_nodes_cover_undo_and_redo_stacks() {
        let ids = ids(2);
        let mut log: UndoLog<()> = UndoLog::new(None);
        log.push(
            "a",
            Command::Insert {
                node: ids[0],
                parent: ids[1],
                index: 0,
            },
        );
        let group = log.take_undo().unwrap();
        log.push_redo(group);
        assert!(log.referenced_nodes().contains(&ids[0]));
        assert!(!log.referenced_nodes().contains(&ids[1]));
    }
}
