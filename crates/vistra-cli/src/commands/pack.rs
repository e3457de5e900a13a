use crate::cli::PackArgs;
use crate::error::{CliError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use vistra::core::codec::BytesCodec;
use vistra::core::models::ids::NodeId;
use vistra::core::models::node::{PayloadSlot, TreeNode};
use vistra::engine::config::EngineConfig;
use vistra::workflows::document::Document;

type ByteDocument = Document<Vec<u8>, BytesCodec>;

pub fn run(args: PackArgs) -> Result<()> {
    if !args.input.is_dir() {
        return Err(CliError::Argument(format!(
            "'{}' is not a directory",
            args.input.display()
        )));
    }

    let total = count_files(&args.input)?;
    info!(files = total, "packing directory");
    let pb = ProgressBar::new(total as u64).with_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .expect("progress template"),
    );

    let mut doc = ByteDocument::new(BytesCodec, &EngineConfig::default());
    let root = doc.tree().root();
    pack_dir(&mut doc, &args.input, root, &pb)?;
    doc.save_as(&args.output)?;
    pb.finish_and_clear();

    println!(
        "Packed {} files into {}",
        total,
        args.output.display()
    );
    Ok(())
}

fn count_files(dir: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            count += count_files(&path)?;
        } else {
            count += 1;
        }
    }
    Ok(count)
}

fn pack_dir(doc: &mut ByteDocument, dir: &Path, parent: NodeId, pb: &ProgressBar) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_dir() {
            let group = doc
                .mutator_mut()
                .insert(TreeNode::group(&name), parent, usize::MAX)?;
            pack_dir(doc, &path, group, pb)?;
        } else {
            let bytes = fs::read(&path).map_err(|source| CliError::FileRead {
                path: path.clone(),
                source,
            })?;
            debug!(file = %path.display(), size = bytes.len(), "packed");
            doc.mutator_mut().insert(
                TreeNode::leaf(&name, PayloadSlot::loaded(bytes, None)),
                parent,
                usize::MAX,
            )?;
            pb.inc(1);
        }
    }
    Ok(())
}
