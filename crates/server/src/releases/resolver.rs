//! Release resolution: storage listings merged with ledger provenance.

use super::error::{ReleaseError, ReleaseResult};
use crate::metrics;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use updraft_core::release::{
    RELEASES_PREFIX, compare_runtime_versions, runtime_prefix, validate_runtime_version,
};
use updraft_core::{Release, ReleaseKey, UpdateId};
use updraft_metadata::MetadataStore;
use updraft_metadata::models::{NewRollback, ReleaseRow};
use updraft_storage::{ObjectInfo, ObjectStore};

/// Per runtime version overview.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSummary {
    pub runtime_version: String,
    pub active_release: Option<Release>,
    pub total_releases: usize,
}

/// Result of a recorded rollback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RollbackOutcome {
    /// Release that is now active.
    pub path: String,
    pub runtime_version: String,
    /// Release that was active before the rollback.
    pub previous_path: Option<String>,
}

/// Reads releases and decides which one is active per runtime version.
#[derive(Clone)]
pub struct ReleaseResolver {
    storage: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
}

impl ReleaseResolver {
    pub fn new(storage: Arc<dyn ObjectStore>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self { storage, metadata }
    }

    /// Runtime versions that have a directory under `updates/`, in version order.
    pub async fn list_runtime_versions(&self) -> ReleaseResult<Vec<String>> {
        let mut versions: Vec<String> = self
            .storage
            .list_directories(RELEASES_PREFIX)
            .await?
            .into_iter()
            .filter(|name| match validate_runtime_version(name) {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(directory = %name, error = %e, "Skipping release directory");
                    false
                }
            })
            .collect();
        versions.sort_by(|a, b| compare_runtime_versions(a, b));
        Ok(versions)
    }

    /// Releases of `runtime_version`, newest first.
    pub async fn list_releases(&self, runtime_version: &str) -> ReleaseResult<Vec<Release>> {
        check_runtime_version(runtime_version)?;
        let rows = self
            .metadata
            .list_releases_for_runtime(runtime_version)
            .await
            .map_err(ReleaseError::LedgerUnavailable)?;
        self.merged_releases(runtime_version, rows).await
    }

    /// The release devices on `runtime_version` should run.
    pub async fn active_release(&self, runtime_version: &str) -> ReleaseResult<Option<Release>> {
        let releases = self.list_releases(runtime_version).await?;
        self.select_active(runtime_version, &releases).await
    }

    /// Every release, grouped by runtime version in version order, newest first within a group.
    pub async fn list_all_releases(&self) -> ReleaseResult<Vec<Release>> {
        let mut all = Vec::new();
        for (_, releases) in self.releases_by_runtime().await? {
            all.extend(releases);
        }
        Ok(all)
    }

    /// Active release and release count for each runtime version.
    pub async fn runtime_summaries(&self) -> ReleaseResult<Vec<RuntimeSummary>> {
        let mut summaries = Vec::new();
        for (runtime_version, releases) in self.releases_by_runtime().await? {
            let active_release = self.select_active(&runtime_version, &releases).await?;
            summaries.push(RuntimeSummary {
                runtime_version,
                active_release,
                total_releases: releases.len(),
            });
        }
        Ok(summaries)
    }

    /// Make `target_path` the active release of its runtime version.
    ///
    /// The rollback stays in effect until a newer release is ingested.
    pub async fn rollback(&self, target_path: &str) -> ReleaseResult<RollbackOutcome> {
        let key = ReleaseKey::parse(target_path)
            .map_err(|e| ReleaseError::InvalidInput(e.to_string()))?;
        let runtime_version = key.runtime_version();

        if self
            .metadata
            .get_release_by_path(target_path)
            .await
            .map_err(ReleaseError::LedgerUnavailable)?
            .is_none()
        {
            return Err(ReleaseError::UnknownRelease(target_path.to_string()));
        }

        let releases = self.list_releases(runtime_version).await?;
        if !releases.iter().any(|r| r.path == target_path) {
            tracing::warn!(
                path = %target_path,
                runtime_version,
                "Rollback target is recorded but its archive is gone"
            );
            return Err(ReleaseError::UnknownRelease(target_path.to_string()));
        }

        let active = self.select_active(runtime_version, &releases).await?;
        if active.as_ref().is_some_and(|r| r.path == target_path) {
            return Err(ReleaseError::NoOpRollback(target_path.to_string()));
        }

        let newest = releases
            .first()
            .ok_or_else(|| ReleaseError::Internal("release listing emptied".to_string()))?;
        let pointer = self
            .metadata
            .create_rollback(&NewRollback {
                runtime_version: runtime_version.to_string(),
                target_path: target_path.to_string(),
                superseded_path: newest.path.clone(),
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .map_err(ReleaseError::LedgerWriteFailed)?;

        metrics::ROLLBACKS.inc();
        let previous_path = active.map(|r| r.path);
        tracing::info!(
            rollback_id = pointer.rollback_id,
            runtime_version,
            path = %target_path,
            previous_path = ?previous_path,
            "Rolled back release"
        );

        Ok(RollbackOutcome {
            path: target_path.to_string(),
            runtime_version: runtime_version.to_string(),
            previous_path,
        })
    }

    async fn merged_releases(
        &self,
        runtime_version: &str,
        rows: Vec<ReleaseRow>,
    ) -> ReleaseResult<Vec<Release>> {
        let objects = self.storage.list_files(&runtime_prefix(runtime_version)).await?;
        Ok(merge_releases(runtime_version, objects, rows))
    }

    /// Releases for every runtime version, with one ledger query in total.
    async fn releases_by_runtime(&self) -> ReleaseResult<Vec<(String, Vec<Release>)>> {
        let mut rows_by_runtime: HashMap<String, Vec<ReleaseRow>> = HashMap::new();
        for row in self
            .metadata
            .list_releases()
            .await
            .map_err(ReleaseError::LedgerUnavailable)?
        {
            rows_by_runtime
                .entry(row.runtime_version.clone())
                .or_default()
                .push(row);
        }

        let mut grouped = Vec::new();
        for runtime_version in self.list_runtime_versions().await? {
            let rows = rows_by_runtime.remove(&runtime_version).unwrap_or_default();
            let releases = self.merged_releases(&runtime_version, rows).await?;
            grouped.push((runtime_version, releases));
        }
        Ok(grouped)
    }

    /// Apply the latest rollback pointer, if it is still in effect.
    ///
    /// `releases` must be ordered newest first.
    async fn select_active(
        &self,
        runtime_version: &str,
        releases: &[Release],
    ) -> ReleaseResult<Option<Release>> {
        let Some(newest) = releases.first() else {
            return Ok(None);
        };

        let pointer = self
            .metadata
            .latest_rollback(runtime_version)
            .await
            .map_err(ReleaseError::LedgerUnavailable)?;

        if let Some(pointer) = pointer.filter(|p| p.superseded_path == newest.path) {
            match releases.iter().find(|r| r.path == pointer.target_path) {
                Some(target) => return Ok(Some(target.clone())),
                None => tracing::warn!(
                    runtime_version,
                    target = %pointer.target_path,
                    "Rollback target is no longer stored; serving newest release"
                ),
            }
        }
        Ok(Some(newest.clone()))
    }
}

pub(crate) fn check_runtime_version(runtime_version: &str) -> ReleaseResult<()> {
    validate_runtime_version(runtime_version).map_err(|e| ReleaseError::InvalidInput(e.to_string()))
}

/// Build a [`Release`] from its ledger row.
pub(crate) fn release_from_row(row: ReleaseRow, size: u64) -> Release {
    Release {
        path: row.path,
        runtime_version: row.runtime_version,
        timestamp: row.created_at,
        size,
        commit_hash: row.commit_hash,
        commit_message: row.commit_message,
        update_id: Some(UpdateId::from_uuid(row.update_id)),
        release_id: Some(row.release_id),
    }
}

/// Join stored objects with ledger rows by path and order newest first.
///
/// Stored objects decide existence. Rows without an object are dropped.
fn merge_releases(
    runtime_version: &str,
    objects: Vec<ObjectInfo>,
    rows: Vec<ReleaseRow>,
) -> Vec<Release> {
    let mut rows: HashMap<String, ReleaseRow> =
        rows.into_iter().map(|row| (row.path.clone(), row)).collect();

    let mut releases = Vec::with_capacity(objects.len());
    for object in objects {
        let key = match ReleaseKey::parse(&object.key) {
            Ok(key) if key.runtime_version() == runtime_version => key,
            _ => {
                tracing::debug!(key = %object.key, "Ignoring object that is not a release archive");
                continue;
            }
        };

        let release = match rows.remove(&object.key) {
            Some(row) => release_from_row(row, object.size),
            None => Release {
                timestamp: key
                    .timestamp()
                    .or(object.last_modified)
                    .unwrap_or(OffsetDateTime::UNIX_EPOCH),
                path: object.key,
                runtime_version: runtime_version.to_string(),
                size: object.size,
                commit_hash: None,
                commit_message: None,
                update_id: None,
                release_id: None,
            },
        };
        releases.push(release);
    }

    for path in rows.keys() {
        tracing::debug!(path = %path, runtime_version, "Ledger release has no stored archive");
    }

    releases.sort_by(newest_first);
    releases
}

/// Timestamp descending, then ledger insertion order (recorded before
/// unrecorded), then path.
fn newest_first(a: &Release, b: &Release) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| b.release_id.cmp(&a.release_id))
        .then_with(|| b.path.cmp(&a.path))
}
