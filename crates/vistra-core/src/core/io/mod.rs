//! # Archive I/O Module
//!
//! Reading and writing of the on-disk document format: a multi-entry binary
//! container ([`container`]) holding one entry for the tree skeleton, one
//! per auxiliary table, and one per leaf payload ([`archive`]). Entries are
//! independently addressable; damage to one leaf entry never prevents
//! decoding the skeleton or the remaining leaves.

pub mod archive;
pub mod container;

use crate::core::codec::CodecError;
use crate::core::models::ids::StableId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The skeleton entry is missing or unparsable; the read aborts and
    /// nothing is attached to the document.
    #[error("corrupt archive: {reason}")]
    CorruptArchive { reason: String },

    #[error("archive I/O failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("failed to serialize archive entry '{entry}': {reason}")]
    EntrySerialize { entry: String, reason: String },

    #[error("failed to encode payload for node {id}: {source}")]
    PayloadEncode {
        id: StableId,
        #[source]
        source: CodecError,
    },
}

impl ArchiveError {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        ArchiveError::CorruptArchive {
            reason: reason.into(),
        }
    }
}
