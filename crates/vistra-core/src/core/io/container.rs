use super::ArchiveError;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::warn;

const MAGIC: [u8; 4] = *b"VSAR";
const FORMAT_VERSION: u16 = 1;

/// A named multi-entry binary container.
///
/// Entries are unordered on disk; readers index them by name, never by
/// position. Each entry is an independent length-prefixed byte stream, so a
/// truncated tail (e.g. from an interrupted write) only loses the entries
/// past the truncation point.
#[derive(Debug, Clone, Default)]
pub struct Container {
    entries: Vec<(String, Vec<u8>)>,
    index: HashMap<String, usize>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an entry.
    pub fn insert(&mut self, name: impl Into<String>, data: Vec<u8>) {
        let name = name.into();
        match self.index.get(&name) {
            Some(&i) => self.entries[i].1 = data,
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, data));
            }
        }
    }

    /// Looks up an entry's bytes by name.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.index.get(name).map(|&i| self.entries[i].1.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the container to a writer.
    ///
    /// An entry whose data exceeds the u32 frame limit fails the whole
    /// write; a truncated length prefix would desynchronize every entry
    /// behind it on read.
    pub fn write_to(&self, w: &mut impl Write) -> Result<(), ArchiveError> {
        w.write_all(&MAGIC)?;
        w.write_all(&FORMAT_VERSION.to_le_bytes())?;
        for (name, data) in &self.entries {
            let data_len = frame_len(name, data.len())?;
            let name_bytes = name.as_bytes();
            w.write_all(&(name_bytes.len() as u16).to_le_bytes())?;
            w.write_all(name_bytes)?;
            w.write_all(&data_len.to_le_bytes())?;
            w.write_all(data)?;
        }
        Ok(())
    }

    /// Deserializes a container from a reader.
    ///
    /// A bad header fails with `CorruptArchive`; a truncated trailing entry
    /// is tolerated and reading stops at the last complete entry.
    pub fn read_from(r: &mut impl Read) -> Result<Self, ArchiveError> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)
            .map_err(|_| ArchiveError::corrupt("missing container header"))?;
        if magic != MAGIC {
            return Err(ArchiveError::corrupt("bad container magic"));
        }
        let mut version = [0u8; 2];
        r.read_exact(&mut version)
            .map_err(|_| ArchiveError::corrupt("missing container version"))?;
        let version = u16::from_le_bytes(version);
        if version > FORMAT_VERSION {
            return Err(ArchiveError::corrupt(format!(
                "unsupported container version {version}"
            )));
        }

        let mut container = Container::new();
        loop {
            let mut len = [0u8; 2];
            match read_fully(r, &mut len) {
                ReadOutcome::Complete => {}
                ReadOutcome::Eof => break,
                ReadOutcome::Truncated => {
                    warn!("container truncated inside an entry header; dropping tail");
                    break;
                }
            }
            let name_len = u16::from_le_bytes(len) as usize;
            let mut name_bytes = vec![0u8; name_len];
            if !matches!(read_fully(r, &mut name_bytes), ReadOutcome::Complete) {
                warn!("container truncated inside an entry name; dropping tail");
                break;
            }
            let Ok(name) = String::from_utf8(name_bytes) else {
                warn!("container entry name is not valid UTF-8; dropping tail");
                break;
            };
            let mut data_len = [0u8; 4];
            if !matches!(read_fully(r, &mut data_len), ReadOutcome::Complete) {
                warn!(entry = %name, "container truncated before entry data; dropping tail");
                break;
            }
            let data_len = u32::from_le_bytes(data_len) as usize;
            let mut data = vec![0u8; data_len];
            if !matches!(read_fully(r, &mut data), ReadOutcome::Complete) {
                warn!(entry = %name, "container truncated inside entry data; dropping tail");
                break;
            }
            container.insert(name, data);
        }
        Ok(container)
    }

    /// Writes the container to `path` via a sibling temporary file and an
    /// atomic rename, so a crash mid-save never clobbers the previous
    /// archive.
    pub fn save(&self, path: &Path) -> Result<(), ArchiveError> {
        let tmp = temp_sibling(path);
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            self.write_to(&mut writer)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Reads a container from `path`.
    pub fn load(path: &Path) -> Result<Self, ArchiveError> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read_from(&mut reader)
    }
}

fn frame_len(entry: &str, len: usize) -> Result<u32, ArchiveError> {
    u32::try_from(len).map_err(|_| ArchiveError::EntrySerialize {
        entry: entry.to_string(),
        reason: format!("{len} bytes exceeds the 4 GiB entry frame limit"),
    })
}

fn temp_sibling(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "archive".into());
    name.push(".partial");
    path.with_file_name(name)
}

enum ReadOutcome {
    Complete,
    Eof,
    Truncated,
}

fn read_fully(r: &mut impl Read, buf: &mut [u8]) -> ReadOutcome {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => {
                return if filled == 0 {
                    ReadOutcome::Eof
                } else {
                    ReadOutcome::Truncated
                };
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => return ReadOutcome::Truncated,
        }
    }
    ReadOutcome::Complete
}
