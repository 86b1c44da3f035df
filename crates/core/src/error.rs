//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid platform: {0}")]
    InvalidPlatform(String),

    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    #[error("archive entry not found: {0}")]
    EntryNotFound(String),

    #[error("manifest parse error: {0}")]
    ManifestParse(String),

    #[error("invalid release key: {0}")]
    InvalidReleaseKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
