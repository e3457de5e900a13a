use std::path::PathBuf;
use thiserror::Error;
use vistra::core::io::ArchiveError;
use vistra::engine::error::EngineError;
use vistra::workflows::document::DocumentError;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Failed to read '{path}': {source}", path = path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
