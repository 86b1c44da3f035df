//! Error taxonomy of the release engine.

use thiserror::Error;
use updraft_metadata::MetadataError;
use updraft_storage::StorageError;

/// Release engine errors.
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid platform {0:?}, expected \"ios\" or \"android\"")]
    InvalidPlatform(String),

    #[error("invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("corrupt manifest in {path}: {reason}")]
    CorruptManifest { path: String, reason: String },

    #[error("archive {path} has no entry {entry}")]
    EntryNotFound { path: String, entry: String },

    #[error("asset not found: {0}")]
    AssetNotFound(String),

    #[error("no MIME type for extension {0:?}")]
    UnknownMimeType(String),

    #[error("no active release for runtime version {0}")]
    NoActiveRelease(String),

    #[error("release {0} is already active")]
    NoOpRollback(String),

    #[error("unknown release: {0}")]
    UnknownRelease(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] StorageError),

    #[error("ledger write failed: {0}")]
    LedgerWriteFailed(#[source] MetadataError),

    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(#[source] MetadataError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ReleaseError {
    /// Caller errors, rejected before any storage or ledger access.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::MissingField(_) | Self::InvalidPlatform(_)
        )
    }

    /// Disagreement between a stored archive and its own manifest.
    pub fn is_integrity_fault(&self) -> bool {
        matches!(
            self,
            Self::CorruptManifest { .. } | Self::EntryNotFound { .. } | Self::UnknownMimeType(_)
        )
    }

    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::MissingField(_) => "missing_field",
            Self::InvalidPlatform(_) => "invalid_platform",
            Self::InvalidBundle(_) => "invalid_bundle",
            Self::CorruptManifest { .. } => "corrupt_manifest",
            Self::EntryNotFound { .. } => "entry_not_found",
            Self::AssetNotFound(_) => "asset_not_found",
            Self::UnknownMimeType(_) => "unknown_mime_type",
            Self::NoActiveRelease(_) => "no_active_release",
            Self::NoOpRollback(_) => "noop_rollback",
            Self::UnknownRelease(_) => "unknown_release",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::LedgerWriteFailed(_) => "ledger_write_failed",
            Self::LedgerUnavailable(_) => "ledger_unavailable",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<StorageError> for ReleaseError {
    fn from(err: StorageError) -> Self {
        Self::StorageUnavailable(err)
    }
}

/// Result type for release engine operations.
pub type ReleaseResult<T> = std::result::Result<T, ReleaseError>;
