use crate::core::models::ids::NodeId;

/// What happened to a node, as seen by a presentation layer that wants to
/// refresh the affected rows without knowing how the change was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Removed,
    Moved,
    Renamed,
    PayloadReplaced,
    SelectionChanged,
    StatusChanged,
}

/// Observer callback invoked on the primary context after each change.
pub type TreeObserver = Box<dyn Fn(NodeId, ChangeKind) + Send>;

/// Fan-out of tree change notifications to registered observers.
#[derive(Default)]
pub struct ChangeNotifier {
    observers: Vec<TreeObserver>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: TreeObserver) {
        self.observers.push(observer);
    }

    pub fn notify(&self, node: NodeId, kind: ChangeKind) {
        for observer in &self.observers {
            observer(node, kind);
        }
    }
}
