//! Asset resolution against the active release of a runtime version.

use super::error::{ReleaseError, ReleaseResult};
use super::resolver::{ReleaseResolver, check_runtime_version};
use crate::metrics;
use bytes::Bytes;
use futures::Stream;
use std::sync::Arc;
use std::time::Instant;
use updraft_core::manifest::{
    APP_CONFIG_ENTRY, LAUNCH_ASSET_CONTENT_TYPE, MANIFEST_ENTRY, normalize_extension,
};
use updraft_core::{
    BundleArchive, BundleManifest, ContentHash, EntryReader, OVERSIZED_ASSET_BYTES, Platform,
    Release, STREAM_CHUNK_SIZE,
};
use updraft_storage::ObjectStore;

/// An archive fetched from storage with its parsed manifest.
#[derive(Clone, Debug)]
pub struct LoadedBundle {
    pub release: Release,
    pub manifest: BundleManifest,
    pub archive: BundleArchive,
}

impl LoadedBundle {
    /// Parsed `expoConfig.json`, when the bundle ships one.
    pub async fn app_config(&self) -> ReleaseResult<Option<serde_json::Value>> {
        if !self.archive.contains(APP_CONFIG_ENTRY) {
            return Ok(None);
        }
        let bytes = self.read_entry(APP_CONFIG_ENTRY).await?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ReleaseError::CorruptManifest {
                path: self.release.path.clone(),
                reason: format!("{APP_CONFIG_ENTRY}: {e}"),
            })
    }

    /// Decompress one entry of the archive.
    pub async fn read_entry(&self, name: &str) -> ReleaseResult<Bytes> {
        read_entry(self.archive.clone(), &self.release.path, name).await
    }

    /// SHA-256 of each named entry's decompressed bytes, in order.
    pub async fn hash_entries(&self, names: Vec<String>) -> ReleaseResult<Vec<ContentHash>> {
        let archive = self.archive.clone();
        let path = self.release.path.clone();
        tokio::task::spawn_blocking(move || {
            names
                .iter()
                .map(|name| {
                    archive
                        .read_entry(name)
                        .map(|bytes| ContentHash::compute(&bytes))
                        .map_err(|e| entry_error(&path, e))
                })
                .collect()
        })
        .await
        .map_err(|e| ReleaseError::Internal(format!("archive task failed: {e}")))?
    }
}

/// A validated asset of the active release, ready to be served.
#[derive(Debug)]
pub struct ResolvedAsset {
    pub release: Release,
    pub platform: Platform,
    pub asset_path: String,
    pub content_type: String,
    pub is_launch_asset: bool,
    /// Uncompressed entry size.
    pub size: u64,
    archive: BundleArchive,
}

impl ResolvedAsset {
    /// Decompress the whole asset into memory.
    pub async fn bytes(&self) -> ReleaseResult<Bytes> {
        let bytes = read_entry(self.archive.clone(), &self.release.path, &self.asset_path).await?;
        metrics::ASSET_BYTES_SERVED.inc_by(bytes.len() as u64);
        Ok(bytes)
    }

    /// Stream the asset in fixed-size chunks.
    ///
    /// Each chunk is decompressed by its own short blocking task, so a slow
    /// consumer holds no blocking thread between chunks.
    pub fn into_stream(self) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
        let Self {
            release,
            asset_path,
            archive,
            ..
        } = self;

        let (reader, open_error) = match archive.entry_reader(&asset_path) {
            Ok(reader) => (Some(reader), None),
            Err(e) => (None, Some(e)),
        };
        let state = ChunkState {
            reader,
            open_error,
            release_path: release.path,
            asset_path,
            sent: 0,
        };
        futures::stream::unfold(state, next_chunk)
    }
}

struct ChunkState {
    reader: Option<EntryReader>,
    open_error: Option<updraft_core::Error>,
    release_path: String,
    asset_path: String,
    sent: u64,
}

async fn next_chunk(mut state: ChunkState) -> Option<(std::io::Result<Bytes>, ChunkState)> {
    if let Some(e) = state.open_error.take() {
        return Some((Err(state.stream_failed(e.to_string())), state));
    }
    let mut reader = state.reader.take()?;

    let joined = tokio::task::spawn_blocking(move || {
        let chunk = reader.next_chunk(STREAM_CHUNK_SIZE);
        (reader, chunk)
    })
    .await;

    match joined {
        Ok((reader, Ok(Some(chunk)))) => {
            state.sent += chunk.len() as u64;
            metrics::ASSET_BYTES_SERVED.inc_by(chunk.len() as u64);
            state.reader = Some(reader);
            Some((Ok(chunk), state))
        }
        Ok((_, Ok(None))) => {
            tracing::debug!(
                path = %state.release_path,
                asset = %state.asset_path,
                bytes = state.sent,
                "Asset stream finished"
            );
            None
        }
        Ok((_, Err(e))) => Some((Err(state.stream_failed(e.to_string())), state)),
        Err(e) => Some((
            Err(state.stream_failed(format!("archive task failed: {e}"))),
            state,
        )),
    }
}

impl ChunkState {
    fn stream_failed(&self, reason: String) -> std::io::Error {
        tracing::error!(
            path = %self.release_path,
            asset = %self.asset_path,
            bytes = self.sent,
            error = %reason,
            "Asset extraction failed mid-stream"
        );
        std::io::Error::other(reason)
    }
}

/// Resolves client asset requests to entries of the active release archive.
#[derive(Clone)]
pub struct AssetResolver {
    releases: ReleaseResolver,
    storage: Arc<dyn ObjectStore>,
}

impl AssetResolver {
    pub fn new(releases: ReleaseResolver, storage: Arc<dyn ObjectStore>) -> Self {
        Self { releases, storage }
    }

    /// Resolve `asset_path` for `platform` against the active release of `runtime_version`.
    ///
    /// Arguments are validated before any storage or ledger access.
    pub async fn resolve_asset(
        &self,
        runtime_version: &str,
        platform: &str,
        asset_path: &str,
    ) -> ReleaseResult<ResolvedAsset> {
        let platform: Platform = platform
            .parse()
            .map_err(|_| ReleaseError::InvalidPlatform(platform.to_string()))?;
        if asset_path.trim().is_empty() {
            return Err(ReleaseError::InvalidInput(
                "asset path must not be empty".to_string(),
            ));
        }
        check_runtime_version(runtime_version)?;

        let started = Instant::now();
        let result = self.resolve_active(runtime_version, platform, asset_path).await;
        metrics::ASSET_RESOLUTION_DURATION.observe(started.elapsed().as_secs_f64());

        if let Ok(asset) = &result {
            let kind = if asset.is_launch_asset { "launch" } else { "asset" };
            metrics::ASSETS_SERVED
                .with_label_values(&[platform.as_str(), kind])
                .inc();
        }
        result
    }

    /// Fetch and open the archive of `release`.
    pub async fn load_bundle(&self, release: Release) -> ReleaseResult<LoadedBundle> {
        let bytes = self.storage.get(&release.path).await.map_err(|e| {
            tracing::error!(path = %release.path, error = %e, "Failed to fetch release archive");
            ReleaseError::StorageUnavailable(e)
        })?;

        let path = release.path.clone();
        let (archive, manifest) = tokio::task::spawn_blocking(move || {
            let corrupt = |reason: String| ReleaseError::CorruptManifest {
                path: path.clone(),
                reason,
            };
            let archive = BundleArchive::open(bytes).map_err(|e| corrupt(e.to_string()))?;
            let manifest_bytes = archive
                .read_entry(MANIFEST_ENTRY)
                .map_err(|e| corrupt(e.to_string()))?;
            let manifest =
                BundleManifest::parse(&manifest_bytes).map_err(|e| corrupt(e.to_string()))?;
            Ok::<_, ReleaseError>((archive, manifest))
        })
        .await
        .map_err(|e| ReleaseError::Internal(format!("archive task failed: {e}")))??;

        Ok(LoadedBundle {
            release,
            manifest,
            archive,
        })
    }

    async fn resolve_active(
        &self,
        runtime_version: &str,
        platform: Platform,
        asset_path: &str,
    ) -> ReleaseResult<ResolvedAsset> {
        let release = self
            .releases
            .active_release(runtime_version)
            .await?
            .ok_or_else(|| ReleaseError::NoActiveRelease(runtime_version.to_string()))?;

        let bundle = self
            .load_bundle(release)
            .await
            .map_err(|e| integrity_fault(e, runtime_version, platform, asset_path))?;
        let LoadedBundle {
            release,
            manifest,
            archive,
        } = bundle;

        let not_found = || ReleaseError::AssetNotFound(asset_path.to_string());
        let section = manifest.platform(platform).ok_or_else(not_found)?;
        let is_launch_asset = section.is_launch_asset(asset_path);
        let declared_ext = if is_launch_asset {
            None
        } else {
            Some(section.find_asset(asset_path).ok_or_else(not_found)?.ext.clone())
        };

        let fault = |e| integrity_fault(e, runtime_version, platform, asset_path);

        if !archive.contains(asset_path) {
            return Err(fault(ReleaseError::EntryNotFound {
                path: release.path.clone(),
                entry: asset_path.to_string(),
            }));
        }

        let content_type = match declared_ext {
            None => LAUNCH_ASSET_CONTENT_TYPE.to_string(),
            Some(ext) => content_type_for_extension(&ext)
                .ok_or_else(|| fault(ReleaseError::UnknownMimeType(ext)))?,
        };

        let size = archive.entry_size(asset_path).map_err(|e| {
            fault(ReleaseError::EntryNotFound {
                path: release.path.clone(),
                entry: format!("{asset_path} ({e})"),
            })
        })?;
        if size > OVERSIZED_ASSET_BYTES {
            metrics::OVERSIZED_ASSETS.inc();
            tracing::warn!(
                runtime_version,
                platform = %platform,
                asset = %asset_path,
                path = %release.path,
                size_bytes = size,
                "Oversized asset served from archive"
            );
        }

        Ok(ResolvedAsset {
            release,
            platform,
            asset_path: asset_path.to_string(),
            content_type,
            is_launch_asset,
            size,
            archive,
        })
    }
}

/// MIME type for a declared asset extension; a leading dot and case are ignored.
pub fn content_type_for_extension(ext: &str) -> Option<String> {
    let ext = normalize_extension(ext);
    if ext.is_empty() {
        return None;
    }
    mime_guess::from_ext(&ext)
        .first()
        .map(|mime| mime.essence_str().to_string())
}

/// Log and count archive integrity faults; other errors pass through.
fn integrity_fault(
    err: ReleaseError,
    runtime_version: &str,
    platform: Platform,
    asset_path: &str,
) -> ReleaseError {
    if err.is_integrity_fault() {
        metrics::INTEGRITY_FAULTS
            .with_label_values(&[err.reason()])
            .inc();
        tracing::error!(
            runtime_version,
            platform = %platform,
            asset = %asset_path,
            error = %err,
            "Release archive disagrees with its manifest"
        );
    }
    err
}

async fn read_entry(archive: BundleArchive, release_path: &str, name: &str) -> ReleaseResult<Bytes> {
    let entry = name.to_string();
    tokio::task::spawn_blocking(move || archive.read_entry(&entry))
        .await
        .map_err(|e| ReleaseError::Internal(format!("archive task failed: {e}")))?
        .map_err(|e| entry_error(release_path, e))
}

fn entry_error(release_path: &str, err: updraft_core::Error) -> ReleaseError {
    match err {
        updraft_core::Error::EntryNotFound(entry) => ReleaseError::EntryNotFound {
            path: release_path.to_string(),
            entry,
        },
        other => ReleaseError::Internal(format!("{release_path}: {other}")),
    }
}
