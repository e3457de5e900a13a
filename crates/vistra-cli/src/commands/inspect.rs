use crate::cli::InspectArgs;
use crate::error::Result;
use tracing::info;
use vistra::core::codec::BytesCodec;
use vistra::core::models::ids::NodeId;
use vistra::core::models::node::LazyStatus;
use vistra::engine::config::EngineConfig;
use vistra::workflows::document::Document;

type ByteDocument = Document<Vec<u8>, BytesCodec>;

pub fn run(args: InspectArgs) -> Result<()> {
    let mut doc = ByteDocument::open(&args.archive, BytesCodec, &EngineConfig::default())?;

    if args.load {
        let leaves = doc.tree().flattened_leaf_nodes();
        info!(count = leaves.len(), "materializing all payloads");
        for leaf in leaves {
            let has_bytes = doc
                .tree()
                .node(leaf)
                .and_then(|n| n.payload())
                .is_some_and(|slot| slot.raw().is_some());
            if has_bytes {
                doc.request_load(leaf)?;
            }
        }
        while doc.drain_blocking().is_some() {}
    }

    println!("{}", args.archive.display());
    let root = doc.tree().root();
    if let Some(node) = doc.tree().node(root) {
        for &child in node.children() {
            print_node(&doc, child, 1);
        }
    }

    println!(
        "\n{} groups, {} leaves",
        doc.tree().flattened_group_nodes().len(),
        doc.tree().flattened_leaf_nodes().len()
    );
    Ok(())
}

fn print_node(doc: &ByteDocument, id: NodeId, depth: usize) {
    let Some(node) = doc.tree().node(id) else {
        return;
    };
    let indent = "  ".repeat(depth);
    if node.is_group() {
        let lock = if node.is_locked() { " [locked]" } else { "" };
        println!("{indent}{}/{lock}", node.display_name());
        for &child in node.children() {
            print_node(doc, child, depth + 1);
        }
        return;
    }

    let Some(slot) = node.payload() else {
        return;
    };
    let status = match slot.status() {
        LazyStatus::Unloaded => "unloaded",
        LazyStatus::Loading => "loading",
        LazyStatus::Loaded => "loaded",
        LazyStatus::Error => "error",
    };
    let dirty = if slot.is_dirty() { "*" } else { "" };
    let size = match slot.raw() {
        Some(bytes) => format!(", {} B", bytes.len()),
        None => ", no bytes".to_string(),
    };
    println!("{indent}{}{dirty} [{status}{size}]", node.display_name());
}
