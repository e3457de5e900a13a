use super::ArchiveError;
use super::container::Container;
use crate::core::codec::ContentCodec;
use crate::core::models::ids::StableId;
use crate::core::models::node::{PayloadSlot, TreeNode};
use crate::core::models::tree::{ProjectTree, Skeleton, SkeletonNode};
use crate::core::tables::AuxTables;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, instrument, warn};

/// Entry holding the serialized tree skeleton.
pub const SKELETON_ENTRY: &str = "root-skeleton";
/// Entry holding the color tables.
pub const COLORS_ENTRY: &str = "aux-colors";
/// Entry holding the forcefield tables.
pub const FORCEFIELDS_ENTRY: &str = "aux-forcefields";
/// Namespace prefix for per-leaf payload entries.
pub const LEAF_ENTRY_PREFIX: &str = "leaf-";

/// Deterministic archive entry name for a leaf node's payload.
pub fn leaf_entry_name(id: &StableId) -> String {
    format!("{LEAF_ENTRY_PREFIX}{id}")
}

/// Serializes a document into a container.
///
/// The skeleton entry carries ids, names, flags, and child ordering for
/// every attached node and never embeds payload bytes. Each leaf with
/// payload bytes gets its own `leaf-<id>` entry: dirty payloads are
/// re-encoded through the codec, clean ones re-emit their retained bytes.
/// On success every written leaf is marked clean and archived, and freshly
/// encoded bytes become the leaf's retained buffer.
#[instrument(skip_all)]
pub fn write_document<R, C>(
    tree: &mut ProjectTree<R>,
    tables: &AuxTables,
    codec: &C,
) -> Result<Container, ArchiveError>
where
    C: ContentCodec<R>,
{
    let mut container = Container::new();

    let skeleton = tree.skeleton();
    let skeleton_bytes =
        bincode::serialize(&skeleton).map_err(|e| ArchiveError::EntrySerialize {
            entry: SKELETON_ENTRY.to_string(),
            reason: e.to_string(),
        })?;
    container.insert(SKELETON_ENTRY, skeleton_bytes);

    container.insert(
        COLORS_ENTRY,
        bincode::serialize(&tables.color_sets).map_err(|e| ArchiveError::EntrySerialize {
            entry: COLORS_ENTRY.to_string(),
            reason: e.to_string(),
        })?,
    );
    container.insert(
        FORCEFIELDS_ENTRY,
        bincode::serialize(&tables.forcefield_sets).map_err(|e| ArchiveError::EntrySerialize {
            entry: FORCEFIELDS_ENTRY.to_string(),
            reason: e.to_string(),
        })?,
    );

    let leaves = tree.flattened_leaf_nodes();
    let mut written = 0usize;
    for id in leaves {
        let node = tree.node(id).expect("leaf id from flattened iteration");
        let stable = node.stable_id().clone();
        let Some(slot) = node.payload() else { continue };

        let bytes = if slot.is_dirty() {
            let Some(repr) = slot.repr() else {
                warn!(node = %stable, "dirty leaf has no representation; skipping entry");
                continue;
            };
            Some(
                codec
                    .encode(repr)
                    .map_err(|e| ArchiveError::PayloadEncode {
                        id: stable.clone(),
                        source: e,
                    })?,
            )
        } else if let Some(raw) = slot.raw() {
            Some(raw.to_vec())
        } else if let Some(repr) = slot.repr() {
            Some(
                codec
                    .encode(repr)
                    .map_err(|e| ArchiveError::PayloadEncode {
                        id: stable.clone(),
                        source: e,
                    })?,
            )
        } else {
            // Never materialized and no retained bytes; nothing to store.
            None
        };

        if let Some(bytes) = bytes {
            container.insert(leaf_entry_name(&stable), bytes.clone());
            let slot = tree
                .node_mut(id)
                .and_then(|n| n.payload_mut())
                .expect("leaf id from flattened iteration");
            slot.raw = Some(bytes);
            slot.dirty = false;
            slot.archived = true;
            written += 1;
        }
    }
    debug!(leaves = written, entries = container.len(), "archive assembled");

    Ok(container)
}

/// Reconstructs a document from a container.
///
/// The skeleton is decoded first; if it is missing or unparsable the whole
/// read fails with `CorruptArchive`. Leaf payload bytes are attached to
/// their nodes without being decoded, leaving every leaf `Unloaded` for the
/// lazy loader. A missing `leaf-<id>` entry leaves that node unloaded with
/// no payload bytes rather than failing the read.
#[instrument(skip_all)]
pub fn read_document<R>(container: &Container) -> Result<(ProjectTree<R>, AuxTables), ArchiveError> {
    let skeleton_bytes = container
        .get(SKELETON_ENTRY)
        .ok_or_else(|| ArchiveError::corrupt("missing root-skeleton entry"))?;
    let skeleton: Skeleton = bincode::deserialize(skeleton_bytes)
        .map_err(|e| ArchiveError::corrupt(format!("unparsable skeleton: {e}")))?;

    let tree = rebuild_tree(&skeleton, container)?;

    let color_sets = match container.get(COLORS_ENTRY) {
        Some(bytes) => bincode::deserialize(bytes).unwrap_or_else(|e| {
            warn!("unparsable color tables, falling back to empty: {e}");
            Default::default()
        }),
        None => Default::default(),
    };
    let forcefield_sets = match container.get(FORCEFIELDS_ENTRY) {
        Some(bytes) => bincode::deserialize(bytes).unwrap_or_else(|e| {
            warn!("unparsable forcefield tables, falling back to empty: {e}");
            Default::default()
        }),
        None => Default::default(),
    };

    Ok((
        tree,
        AuxTables {
            color_sets,
            forcefield_sets,
        },
    ))
}

fn rebuild_tree<R>(skeleton: &Skeleton, container: &Container) -> Result<ProjectTree<R>, ArchiveError> {
    let mut by_id: HashMap<&StableId, &SkeletonNode> = HashMap::new();
    for node in &skeleton.nodes {
        if by_id.insert(&node.id, node).is_some() {
            return Err(ArchiveError::corrupt(format!(
                "duplicate node id {} in skeleton",
                node.id
            )));
        }
    }
    let root_skel = *by_id
        .get(&skeleton.root)
        .ok_or_else(|| ArchiveError::corrupt("skeleton root id not present"))?;
    if !root_skel.is_group {
        return Err(ArchiveError::corrupt("skeleton root is not a group"));
    }

    let mut root_node: TreeNode<R> =
        TreeNode::group(root_skel.name.clone()).with_stable_id(root_skel.id.clone());
    root_node.set_editable(root_skel.editable);
    let mut tree = ProjectTree::with_root(root_node);

    // Materialize every non-root node detached, then link children in the
    // order the skeleton records.
    let mut handles = HashMap::new();
    handles.insert(root_skel.id.clone(), tree.root());
    for skel in &skeleton.nodes {
        if skel.id == skeleton.root {
            continue;
        }
        let mut node: TreeNode<R> = if skel.is_group {
            let mut g = TreeNode::group(skel.name.clone());
            g.set_locked(skel.locked);
            g
        } else {
            let raw = container.get(&leaf_entry_name(&skel.id)).map(|b| b.to_vec());
            if raw.is_none() {
                warn!(node = %skel.id, "leaf payload entry missing; node stays unloaded");
            }
            let archived = raw.is_some();
            TreeNode::leaf(skel.name.clone(), PayloadSlot::unloaded(raw, archived))
        };
        node.set_editable(skel.editable);
        let node = node.with_stable_id(skel.id.clone());
        handles.insert(skel.id.clone(), tree.insert_detached(node));
    }

    for skel in &skeleton.nodes {
        let parent = handles[&skel.id];
        if !skel.is_group && !skel.children.is_empty() {
            return Err(ArchiveError::corrupt(format!(
                "leaf node {} lists children",
                skel.id
            )));
        }
        for (i, child_id) in skel.children.iter().enumerate() {
            let &child = handles
                .get(child_id)
                .ok_or_else(|| {
                    ArchiveError::corrupt(format!("child id {child_id} not present in skeleton"))
                })?;
            if child == tree.root() || tree.node(child).and_then(|n| n.parent()).is_some() {
                return Err(ArchiveError::corrupt(format!(
                    "node {child_id} is referenced as a child more than once"
                )));
            }
            tree.attach(child, parent, i);
        }
    }

    for (id, &handle) in &handles {
        if handle != tree.root() && !tree.is_attached(handle) {
            return Err(ArchiveError::corrupt(format!(
                "node {id} is not reachable from the skeleton root"
            )));
        }
    }

    Ok(tree)
}

/// Writes a document archive to disk.
pub fn save_to_path<R, C>(
    path: &Path,
    tree: &mut ProjectTree<R>,
    tables: &AuxTables,
    codec: &C,
) -> Result<(), ArchiveError>
where
    C: ContentCodec<R>,
{
    let container = write_document(tree, tables, codec)?;
    container.save(path)
}

/// Reads a document archive from disk.
pub fn load_from_path<R>(path: &Path) -> Result<(ProjectTree<R>, AuxTables), ArchiveError> {
    let container = Container::load(path)?;
    read_document(&container)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::BytesCodec;
    use crate::core::models::node::LazyStatus;

    type ByteTree = ProjectTree<Vec<u8>>;

    fn sample_document() -> (ByteTree, AuxTables) {
        let mut tree: ByteTree = ProjectTree::new();
        let root = tree.root();
        let group = tree.insert_detached(TreeNode::group("scene"));
        tree.attach(group, root, 0);
        let a = tree.insert_detached(TreeNode::leaf(
            "a",
            PayloadSlot::loaded(vec![0xAA; 8], Some(vec![0xAA; 8])),
        ));
        tree.attach(a, group, 0);
        let b = tree.insert_detached(TreeNode::leaf(
            "b",
            PayloadSlot::loaded(vec![0xBB; 4], Some(vec![0xBB; 4])),
        ));
        tree.attach(b, group, 1);
        (tree, AuxTables::default())
    }

    mod write_path {
        use super::*;

        #[test]
        fn skeleton_and_leaf_entries_are_written() {
            let (mut tree, tables) = sample_document();
            let container = write_document(&mut tree, &tables, &BytesCodec).unwrap();

            assert!(container.contains(SKELETON_ENTRY));
            assert!(container.contains(COLORS_ENTRY));
            assert!(container.contains(FORCEFIELDS_ENTRY));
            // Two leaves.
            assert_eq!(container.len(), 5);
        }

        #[test]
        fn writing_marks_leaves_clean_and_archived() {
            let (mut tree, tables) = sample_document();
            let leaf = tree.flattened_leaf_nodes()[0];
            tree.node_mut(leaf).unwrap().payload_mut().unwrap().dirty = true;

            write_document(&mut tree, &tables, &BytesCodec).unwrap();

            let slot = tree.node(leaf).unwrap().payload().unwrap();
            assert!(!slot.is_dirty());
            assert!(slot.is_archived());
            assert!(slot.raw().is_some());
        }

        #[test]
        fn payloadless_leaf_gets_no_entry() {
            let (mut tree, tables) = sample_document();
            let group = tree.flattened_group_nodes()[0];
            let empty = tree.insert_detached(TreeNode::leaf(
                "empty",
                PayloadSlot::unloaded(None, false),
            ));
            tree.attach(empty, group, 2);
            let stable = tree.node(empty).unwrap().stable_id().clone();

            let container = write_document(&mut tree, &tables, &BytesCodec).unwrap();
            assert!(!container.contains(&leaf_entry_name(&stable)));
        }
    }

    mod read_path {
        use super::*;

        #[test]
        fn round_trip_reconstructs_skeleton_with_unloaded_leaves() {
            let (mut tree, tables) = sample_document();
            let skeleton_before = tree.skeleton();
            let container = write_document(&mut tree, &tables, &BytesCodec).unwrap();

            let (back, _tables) = read_document::<Vec<u8>>(&container).unwrap();
            assert_eq!(back.skeleton(), skeleton_before);

            for id in back.flattened_leaf_nodes() {
                let slot = back.node(id).unwrap().payload().unwrap();
                assert_eq!(slot.status(), LazyStatus::Unloaded);
                assert!(slot.raw().is_some(), "payload bytes retained, not decoded");
                assert!(slot.repr().is_none());
            }
        }

        #[test]
        fn missing_skeleton_entry_is_corrupt() {
            let container = Container::new();
            let err = read_document::<Vec<u8>>(&container).unwrap_err();
            assert!(matches!(err, ArchiveError::CorruptArchive { .. }));
        }

        #[test]
        fn unparsable_skeleton_is_corrupt() {
            let mut container = Container::new();
            container.insert(SKELETON_ENTRY, vec![0xFF, 0xFE]);
            let err = read_document::<Vec<u8>>(&container).unwrap_err();
            assert!(matches!(err, ArchiveError::CorruptArchive { .. }));
        }

        #[test]
        fn missing_leaf_entry_leaves_node_unloaded_without_bytes() {
            let (mut tree, tables) = sample_document();
            let a = tree.flattened_leaf_nodes()[0];
            let stable_a = tree.node(a).unwrap().stable_id().clone();
            let mut container = write_document(&mut tree, &tables, &BytesCodec).unwrap();

            // Simulate a dropped leaf entry by rebuilding without it.
            let mut pruned = Container::new();
            for name in container.names().map(str::to_string).collect::<Vec<_>>() {
                if name != leaf_entry_name(&stable_a) {
                    pruned.insert(name.clone(), container.get(&name).unwrap().to_vec());
                }
            }
            container = pruned;

            let (back, _) = read_document::<Vec<u8>>(&container).unwrap();
            let a_back = back.lookup(&stable_a).unwrap();
            let slot = back.node(a_back).unwrap().payload().unwrap();
            assert_eq!(slot.status(), LazyStatus::Unloaded);
            assert!(slot.raw().is_none());
            assert!(!slot.is_archived());

            // Sibling untouched.
            let other = back
                .flattened_leaf_nodes()
                .into_iter()
                .find(|&id| id != a_back)
                .unwrap();
            assert!(back.node(other).unwrap().payload().unwrap().raw().is_some());
        }

        #[test]
        fn unknown_entries_are_ignored() {
            let (mut tree, tables) = sample_document();
            let mut container = write_document(&mut tree, &tables, &BytesCodec).unwrap();
            container.insert("future-extension", vec![1, 2, 3]);
            assert!(read_document::<Vec<u8>>(&container).is_ok());
        }

        #[test]
        fn aux_tables_survive_the_round_trip() {
            let (mut tree, mut tables) = sample_document();
            let mut set = crate::core::tables::ColorSet::default();
            set.colors.insert("Si".into(), [0.5, 0.5, 0.8, 1.0]);
            tables.color_sets.insert("jmol".into(), set);

            let container = write_document(&mut tree, &tables, &BytesCodec).unwrap();
            let (_, back) = read_document::<Vec<u8>>(&container).unwrap();
            assert_eq!(back, tables);
        }
    }

    mod on_disk {
        use super::*;

        #[test]
        fn save_and_load_round_trip() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("project.vsar");

            let (mut tree, tables) = sample_document();
            let skeleton = tree.skeleton();
            save_to_path(&path, &mut tree, &tables, &BytesCodec).unwrap();

            let (back, _) = load_from_path::<Vec<u8>>(&path).unwrap();
            assert_eq!(back.skeleton(), skeleton);
        }
    }
}
