//! Rollback pointer repository.

use crate::error::MetadataResult;
use crate::models::{NewRollback, RollbackRow};
use async_trait::async_trait;

/// Repository for rollback pointers. Pointers are append-only.
#[async_trait]
pub trait RollbackRepo: Send + Sync {
    /// Record a rollback.
    async fn create_rollback(&self, rollback: &NewRollback) -> MetadataResult<RollbackRow>;

    /// Most recently recorded rollback for a runtime version.
    async fn latest_rollback(&self, runtime_version: &str) -> MetadataResult<Option<RollbackRow>>;
}
