//! The `metadata.json` manifest carried at the root of every bundle.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Archive entry holding the manifest.
pub const MANIFEST_ENTRY: &str = "metadata.json";

/// Optional archive entry with the client app config, passed through to devices.
pub const APP_CONFIG_ENTRY: &str = "expoConfig.json";

/// Content type served for launch bundles regardless of their file extension.
pub const LAUNCH_ASSET_CONTENT_TYPE: &str = "application/javascript";

/// Client platform an update is served to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ios" => Ok(Platform::Ios),
            "android" => Ok(Platform::Android),
            other => Err(Error::InvalidPlatform(other.to_string())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One static asset declared for a platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    /// Archive entry name of the asset.
    pub path: String,
    /// Declared file extension, without the leading dot.
    pub ext: String,
}

/// Per-platform section of the manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformMetadata {
    /// Archive entry name of the launch bundle.
    pub bundle: String,
    #[serde(default)]
    pub assets: Vec<AssetEntry>,
}

impl PlatformMetadata {
    pub fn is_launch_asset(&self, path: &str) -> bool {
        self.bundle == path
    }

    /// Find the declared asset for `path`.
    pub fn find_asset(&self, path: &str) -> Option<&AssetEntry> {
        self.assets.iter().find(|asset| asset.path == path)
    }
}

/// Parsed `metadata.json`.
///
/// Platforms are keyed by name so that sections for platforms this server does
/// not serve (e.g. `web`) survive parsing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundler: Option<String>,
    #[serde(rename = "fileMetadata")]
    pub file_metadata: BTreeMap<String, PlatformMetadata>,
}

impl BundleManifest {
    /// Parse manifest bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::ManifestParse(e.to_string()))
    }

    /// The section for `platform`, if the bundle ships one.
    pub fn platform(&self, platform: Platform) -> Option<&PlatformMetadata> {
        self.file_metadata.get(platform.as_str())
    }
}

/// Normalize a declared extension for MIME lookup (`.png` and `PNG` become `png`).
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}
