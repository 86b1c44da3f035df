//! Database models mapping to the ledger schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Releases
// =============================================================================

/// One ingested release. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ReleaseRow {
    /// Insertion sequence; breaks timestamp ties (higher is newer).
    pub release_id: i64,
    /// Storage key of the archive, unique across the ledger.
    pub path: String,
    pub runtime_version: String,
    pub created_at: OffsetDateTime,
    pub commit_hash: Option<String>,
    pub commit_message: Option<String>,
    pub update_id: Uuid,
}

/// Input for [`crate::repos::ReleaseRepo::create_release`].
#[derive(Debug, Clone)]
pub struct NewRelease {
    pub path: String,
    pub runtime_version: String,
    pub created_at: OffsetDateTime,
    pub commit_hash: Option<String>,
    pub commit_message: Option<String>,
    pub update_id: Uuid,
}

// =============================================================================
// Rollback pointers
// =============================================================================

/// A recorded rollback for a runtime version.
///
/// The pointer selects `target_path` as active only while `superseded_path`
/// is still the newest release of the runtime version; any later release
/// takes precedence again.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RollbackRow {
    pub rollback_id: i64,
    pub runtime_version: String,
    pub target_path: String,
    /// Newest release at the time the rollback was recorded.
    pub superseded_path: String,
    pub created_at: OffsetDateTime,
}

/// Input for [`crate::repos::RollbackRepo::create_rollback`].
#[derive(Debug, Clone)]
pub struct NewRollback {
    pub runtime_version: String,
    pub target_path: String,
    pub superseded_path: String,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Download tracking
// =============================================================================

/// Download count for one platform.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TrackingMetric {
    pub platform: String,
    pub count: i64,
}
