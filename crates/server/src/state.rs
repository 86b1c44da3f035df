//! Application state shared across handlers.

use crate::releases::{AssetResolver, IngestPipeline, ReleaseResolver};
use std::sync::Arc;
use updraft_core::config::AppConfig;
use updraft_metadata::MetadataStore;
use updraft_storage::ObjectStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend holding release archives.
    pub storage: Arc<dyn ObjectStore>,
    /// Release ledger.
    pub metadata: Arc<dyn MetadataStore>,
    pub releases: ReleaseResolver,
    pub assets: AssetResolver,
    pub ingest: IngestPipeline,
}

impl AppState {
    /// Create a new application state, wiring the release engine to the backends.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let releases = ReleaseResolver::new(storage.clone(), metadata.clone());
        let assets = AssetResolver::new(releases.clone(), storage.clone());
        let ingest = IngestPipeline::new(storage.clone(), metadata.clone());

        Self {
            config: Arc::new(config),
            storage,
            metadata,
            releases,
            assets,
            ingest,
        }
    }

    /// Base URL for links handed to devices, without a trailing slash.
    ///
    /// `server.public_url` wins; otherwise the request's `Host` header is used.
    pub fn public_base_url(&self, host: Option<&str>) -> Option<String> {
        match (&self.config.server.public_url, host) {
            (Some(url), _) => Some(url.trim_end_matches('/').to_string()),
            (None, Some(host)) => Some(format!("http://{host}")),
            (None, None) => None,
        }
    }
}
