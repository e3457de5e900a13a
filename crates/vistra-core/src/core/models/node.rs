use super::ids::{NodeId, StableId};

/// Materialization state of a leaf node's payload.
///
/// Exactly one state holds at a time. `Error` retains the serialized bytes
/// so a failed decode can be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LazyStatus {
    Unloaded,
    Loading,
    Loaded,
    Error,
}

/// Storage slot for a leaf node's content.
///
/// Holds the serialized bytes (`raw`), the decoded in-memory representation
/// (`repr`), or both. Loading transitions bytes into a representation;
/// editing invalidates the bytes until the node is next serialized.
#[derive(Debug, Clone)]
pub struct PayloadSlot<R> {
    pub(crate) status: LazyStatus,
    pub(crate) raw: Option<Vec<u8>>,
    pub(crate) repr: Option<R>,
    pub(crate) dirty: bool,
    pub(crate) archived: bool,
    pub(crate) generation: u64,
    pub(crate) load_error: Option<String>,
}

impl<R> PayloadSlot<R> {
    /// Creates an unloaded slot, optionally seeded with serialized bytes
    /// read back from an archive.
    pub fn unloaded(raw: Option<Vec<u8>>, archived: bool) -> Self {
        Self {
            status: LazyStatus::Unloaded,
            raw,
            repr: None,
            dirty: false,
            archived,
            generation: 0,
            load_error: None,
        }
    }

    /// Creates a slot that already holds a decoded representation, e.g. for
    /// a freshly imported node. The serialized form, if supplied, is kept as
    /// the re-loadable byte buffer.
    pub fn loaded(repr: R, raw: Option<Vec<u8>>) -> Self {
        Self {
            status: LazyStatus::Loaded,
            raw,
            repr: Some(repr),
            dirty: false,
            archived: false,
            generation: 0,
            load_error: None,
        }
    }

    pub fn status(&self) -> LazyStatus {
        self.status
    }

    pub fn repr(&self) -> Option<&R> {
        self.repr.as_ref()
    }

    pub fn raw(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether this payload has ever been written to an archive.
    pub fn is_archived(&self) -> bool {
        self.archived
    }

    /// The failure reason of the last decode attempt, if the slot is in the
    /// `Error` state.
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }
}

/// Closed sum type over the two node shapes.
///
/// Groups contain children and may lock them against structural edits;
/// leaves hold a payload slot. Adding a new shape is a compile-time-checked
/// change at every match site.
#[derive(Debug, Clone)]
pub enum NodeKind<R> {
    Group { locked: bool },
    Leaf { payload: PayloadSlot<R> },
}

/// The addressable unit of the project hierarchy.
///
/// Each node owns an ordered list of child ids (insertion order is display
/// order) and a non-owning back-reference to its parent, used for path
/// computation only.
#[derive(Debug, Clone)]
pub struct TreeNode<R> {
    pub(crate) stable_id: StableId,
    pub(crate) display_name: String,
    pub(crate) kind: NodeKind<R>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) editable: bool,
}

impl<R> TreeNode<R> {
    /// Creates a detached, unlocked group node.
    pub fn group(display_name: impl Into<String>) -> Self {
        Self {
            stable_id: StableId::random(),
            display_name: display_name.into(),
            kind: NodeKind::Group { locked: false },
            parent: None,
            children: Vec::new(),
            editable: true,
        }
    }

    /// Creates a detached leaf node around the given payload slot.
    pub fn leaf(display_name: impl Into<String>, payload: PayloadSlot<R>) -> Self {
        Self {
            stable_id: StableId::random(),
            display_name: display_name.into(),
            kind: NodeKind::Leaf { payload },
            parent: None,
            children: Vec::new(),
            editable: true,
        }
    }

    /// Replaces the randomly generated stable id, used when reconstructing a
    /// node from an archive skeleton.
    pub fn with_stable_id(mut self, id: StableId) -> Self {
        self.stable_id = id;
        self
    }

    pub fn stable_id(&self) -> &StableId {
        &self.stable_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group { .. })
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Whether this node locks its children against structural edits.
    /// Always `false` for leaves.
    pub fn is_locked(&self) -> bool {
        matches!(self.kind, NodeKind::Group { locked: true })
    }

    pub fn set_locked(&mut self, locked: bool) {
        if let NodeKind::Group { locked: l } = &mut self.kind {
            *l = locked;
        }
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn set_editable(&mut self, editable: bool) {
        self.editable = editable;
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Materialization state; groups report `Loaded` since they have no
    /// payload to materialize.
    pub fn status(&self) -> LazyStatus {
        match &self.kind {
            NodeKind::Group { .. } => LazyStatus::Loaded,
            NodeKind::Leaf { payload } => payload.status,
        }
    }

    pub fn payload(&self) -> Option<&PayloadSlot<R>> {
        match &self.kind {
            NodeKind::Group { .. } => None,
            NodeKind::Leaf { payload } => Some(payload),
        }
    }

    pub(crate) fn payload_mut(&mut self) -> Option<&mut PayloadSlot<R>> {
        match &mut self.kind {
            NodeKind::Group { .. } => None,
            NodeKind::Leaf { payload } => Some(payload),
        }
    }
}
