//! Download tracking repository.

use crate::error::MetadataResult;
use crate::models::TrackingMetric;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for per-release download events.
#[async_trait]
pub trait TrackingRepo: Send + Sync {
    /// Record that a device on `platform` fetched `release_id`.
    async fn record_download(
        &self,
        release_id: i64,
        platform: &str,
        downloaded_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Download counts per platform for one release.
    async fn get_release_tracking_metrics(
        &self,
        release_id: i64,
    ) -> MetadataResult<Vec<TrackingMetric>>;

    /// Download counts per platform across every release.
    async fn get_release_tracking_metrics_for_all_releases(
        &self,
    ) -> MetadataResult<Vec<TrackingMetric>>;
}
