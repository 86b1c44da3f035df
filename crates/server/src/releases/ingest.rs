//! Ingestion of uploaded release bundles.

use super::error::{ReleaseError, ReleaseResult};
use super::resolver::release_from_row;
use crate::metrics;
use bytes::Bytes;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use updraft_core::manifest::MANIFEST_ENTRY;
use updraft_core::release::{truncate_to_millis, validate_runtime_version};
use updraft_core::{BundleArchive, BundleManifest, Release, ReleaseKey, UpdateId};
use updraft_metadata::MetadataStore;
use updraft_metadata::models::NewRelease;
use updraft_storage::{ObjectStore, StorageError};

/// Consecutive millisecond keys tried before an upload is rejected.
const MAX_KEY_ATTEMPTS: u32 = 64;

/// An uploaded bundle with its form fields.
#[derive(Clone, Debug, Default)]
pub struct Upload {
    pub archive: Bytes,
    pub runtime_version: String,
    pub commit_hash: String,
    pub commit_message: Option<String>,
}

/// Stores uploaded bundles and records them in the ledger.
#[derive(Clone)]
pub struct IngestPipeline {
    storage: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
}

impl IngestPipeline {
    pub fn new(storage: Arc<dyn ObjectStore>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self { storage, metadata }
    }

    /// Validate, store and record `upload` as the newest release of its runtime version.
    pub async fn ingest(&self, upload: Upload) -> ReleaseResult<Release> {
        let runtime_version = upload.runtime_version.clone();
        let result = self.ingest_inner(upload).await;
        match &result {
            Ok(release) => {
                metrics::RELEASES_INGESTED.inc();
                tracing::info!(
                    path = %release.path,
                    runtime_version = %release.runtime_version,
                    update_id = ?release.update_id,
                    size_bytes = release.size,
                    "Release ingested"
                );
            }
            Err(e) => {
                metrics::INGEST_FAILURES
                    .with_label_values(&[e.reason()])
                    .inc();
                if e.is_validation() || matches!(e, ReleaseError::InvalidBundle(_)) {
                    tracing::info!(runtime_version = %runtime_version, error = %e, "Upload rejected");
                } else {
                    tracing::error!(runtime_version = %runtime_version, error = %e, "Ingestion failed");
                }
            }
        }
        result
    }

    async fn ingest_inner(&self, upload: Upload) -> ReleaseResult<Release> {
        let Upload {
            archive,
            runtime_version,
            commit_hash,
            commit_message,
        } = upload;

        if archive.is_empty() {
            return Err(ReleaseError::MissingField("file"));
        }
        if runtime_version.trim().is_empty() {
            return Err(ReleaseError::MissingField("runtimeVersion"));
        }
        let commit_hash = commit_hash.trim();
        if commit_hash.is_empty() {
            return Err(ReleaseError::MissingField("commitHash"));
        }
        validate_runtime_version(&runtime_version)
            .map_err(|e| ReleaseError::InvalidInput(e.to_string()))?;
        let commit_message = commit_message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());

        let update_id = manifest_update_id(archive.clone()).await?;

        let size = archive.len() as u64;
        let (path, created_at) = self.store_archive(&runtime_version, archive).await?;

        let row = self
            .metadata
            .create_release(&NewRelease {
                path: path.clone(),
                runtime_version,
                created_at,
                commit_hash: Some(commit_hash.to_string()),
                commit_message,
                update_id: *update_id.as_uuid(),
            })
            .await
            .map_err(|e| {
                tracing::error!(
                    path = %path,
                    error = %e,
                    "Archive stored but not recorded; it stays visible without provenance"
                );
                ReleaseError::LedgerWriteFailed(e)
            })?;

        Ok(release_from_row(row, size))
    }

    /// Write `archive` under the first free millisecond key at or after now.
    ///
    /// Uploads landing in the same millisecond take the following ones, up to
    /// [`MAX_KEY_ATTEMPTS`]. Storage failures are returned as-is.
    async fn store_archive(
        &self,
        runtime_version: &str,
        archive: Bytes,
    ) -> ReleaseResult<(String, OffsetDateTime)> {
        let mut created_at = truncate_to_millis(OffsetDateTime::now_utc());
        let mut last_path = String::new();

        for attempt in 0..MAX_KEY_ATTEMPTS {
            let path = ReleaseKey::new(runtime_version, created_at)
                .map_err(|e| ReleaseError::InvalidInput(e.to_string()))?
                .path();
            if self.storage.put_if_not_exists(&path, archive.clone()).await? {
                if attempt > 0 {
                    tracing::debug!(path = %path, attempt, "Release key shifted past a concurrent upload");
                }
                return Ok((path, created_at));
            }
            last_path = path;
            created_at += Duration::milliseconds(1);
        }

        Err(ReleaseError::StorageUnavailable(StorageError::AlreadyExists(
            last_path,
        )))
    }
}

/// Read and check `metadata.json`, then derive the update id from its bytes.
async fn manifest_update_id(archive: Bytes) -> ReleaseResult<UpdateId> {
    tokio::task::spawn_blocking(move || {
        let invalid = |e: updraft_core::Error| ReleaseError::InvalidBundle(e.to_string());
        let archive = BundleArchive::open(archive).map_err(invalid)?;
        let manifest_bytes = archive.read_entry(MANIFEST_ENTRY).map_err(invalid)?;
        BundleManifest::parse(&manifest_bytes).map_err(invalid)?;
        UpdateId::from_manifest_bytes(&manifest_bytes).map_err(invalid)
    })
    .await
    .map_err(|e| ReleaseError::Internal(format!("archive task failed: {e}")))?
}
