// FILE: crates/library/src/error.rs

use folio_config::ConfigError;
use folio_core::FolioError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error(transparent)]
    Core(#[from] FolioError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Row not found: {0}")]
    RowNotFound(String),

    #[error("Base path is not a directory: {0}")]
    NotADirectory(String),

    #[error("Scanner error: {0}")]
    ScannerError(String),

    #[error("Import failed: {0}")]
    ImportFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl LibraryError {
    /// Races with the filesystem (stale results, vanished entries)
    pub fn is_benign(&self) -> bool {
        matches!(self, LibraryError::Core(e) if e.is_benign())
    }
}

// Both type aliases for convenience
pub type Result<T> = std::result::Result<T, LibraryError>;
pub type LibraryResult<T> = std::result::Result<T, LibraryError>;
