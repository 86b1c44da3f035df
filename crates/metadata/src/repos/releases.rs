//! Release repository.

use crate::error::MetadataResult;
use crate::models::{NewRelease, ReleaseRow};
use async_trait::async_trait;

/// Repository for release records.
#[async_trait]
pub trait ReleaseRepo: Send + Sync {
    /// Append a release.
    ///
    /// Fails with `AlreadyExists` if a release with the same path is recorded.
    async fn create_release(&self, release: &NewRelease) -> MetadataResult<ReleaseRow>;

    /// Look up a release by storage path.
    async fn get_release_by_path(&self, path: &str) -> MetadataResult<Option<ReleaseRow>>;

    /// All releases in insertion order.
    async fn list_releases(&self) -> MetadataResult<Vec<ReleaseRow>>;

    /// Releases of one runtime version in insertion order.
    async fn list_releases_for_runtime(
        &self,
        runtime_version: &str,
    ) -> MetadataResult<Vec<ReleaseRow>>;
}
