//! Update manifest endpoint for devices running an expo-updates compatible client.

use super::common::{encode_query, header_str};
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::releases::{LoadedBundle, ReleaseError, content_type_for_extension};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use updraft_core::manifest::{LAUNCH_ASSET_CONTENT_TYPE, normalize_extension};
use updraft_core::{ContentHash, Platform};

const PROTOCOL_VERSION: &str = "0";
const LAUNCH_ASSET_EXTENSION: &str = ".bundle";

#[derive(Debug, Deserialize)]
pub struct ManifestQuery {
    pub platform: Option<String>,
    #[serde(rename = "runtime-version")]
    pub runtime_version: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestAsset {
    /// Base64url SHA-256 of the asset bytes.
    pub hash: String,
    pub key: String,
    pub file_extension: String,
    pub content_type: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateManifest {
    pub id: String,
    pub created_at: String,
    pub runtime_version: String,
    pub launch_asset: ManifestAsset,
    pub assets: Vec<ManifestAsset>,
    pub metadata: serde_json::Value,
    pub extra: serde_json::Value,
}

/// GET /api/manifest - Describe the active release for a device.
///
/// Platform and runtime version come from the `expo-platform` and
/// `expo-runtime-version` headers, or the `platform` and `runtime-version`
/// query parameters. Devices already on the active update get `204`.
pub async fn get_manifest(
    State(state): State<AppState>,
    Query(query): Query<ManifestQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let platform_name = header_str(&headers, "expo-platform")
        .or(query.platform.as_deref())
        .unwrap_or_default();
    let platform: Platform = platform_name
        .parse()
        .map_err(|_| ReleaseError::InvalidPlatform(platform_name.to_string()))?;
    let runtime_version = header_str(&headers, "expo-runtime-version")
        .or(query.runtime_version.as_deref())
        .unwrap_or_default()
        .to_string();
    if runtime_version.is_empty() {
        return Err(ReleaseError::InvalidInput("missing runtime version".to_string()).into());
    }

    metrics::MANIFEST_REQUESTS
        .with_label_values(&[platform.as_str()])
        .inc();

    let release = state
        .releases
        .active_release(&runtime_version)
        .await?
        .ok_or_else(|| ReleaseError::NoActiveRelease(runtime_version.clone()))?;

    let update_id = release.update_id.map(|id| id.to_string());
    if let (Some(current), Some(active)) = (
        header_str(&headers, "expo-current-update-id"),
        update_id.as_deref(),
    ) {
        if current.eq_ignore_ascii_case(active) {
            tracing::debug!(path = %release.path, platform = %platform, "Device is up to date");
            return Ok(with_protocol_headers(StatusCode::NO_CONTENT.into_response()));
        }
    }

    let bundle = state.assets.load_bundle(release).await.inspect_err(|e| {
        tracing::error!(runtime_version = %runtime_version, error = %e, "Failed to load active release");
    })?;

    let base_url = state
        .public_base_url(header_str(&headers, HOST.as_str()))
        .unwrap_or_default();
    let manifest = build_manifest(&bundle, platform, &base_url).await?;

    if let Some(release_id) = bundle.release.release_id {
        if let Err(e) = state
            .metadata
            .record_download(release_id, platform.as_str(), OffsetDateTime::now_utc())
            .await
        {
            tracing::warn!(
                release_id,
                platform = %platform,
                error = %e,
                "Failed to record download"
            );
        }
    }

    let mut response = Json(manifest).into_response();
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("private, max-age=0"));
    Ok(with_protocol_headers(response))
}

fn with_protocol_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("expo-protocol-version"),
        HeaderValue::from_static(PROTOCOL_VERSION),
    );
    headers.insert(
        HeaderName::from_static("expo-sfv-version"),
        HeaderValue::from_static("0"),
    );
    response
}

async fn build_manifest(
    bundle: &LoadedBundle,
    platform: Platform,
    base_url: &str,
) -> ApiResult<UpdateManifest> {
    let release = &bundle.release;
    let section = bundle.manifest.platform(platform).ok_or_else(|| {
        ApiError::NotFound(format!(
            "release {} has no {platform} update",
            release.path
        ))
    })?;

    let mut names = vec![section.bundle.clone()];
    names.extend(section.assets.iter().map(|asset| asset.path.clone()));
    let hashes = bundle.hash_entries(names).await.inspect_err(|e| {
        tracing::error!(
            path = %release.path,
            platform = %platform,
            error = %e,
            "Manifest lists entries missing from archive"
        );
    })?;

    let asset_url = |path: &str| {
        format!(
            "{base_url}/api/assets?{}",
            encode_query(&[
                ("asset", path),
                ("runtimeVersion", release.runtime_version.as_str()),
                ("platform", platform.as_str()),
            ])
        )
    };

    let launch_asset = manifest_asset(
        &hashes[0],
        LAUNCH_ASSET_EXTENSION.to_string(),
        LAUNCH_ASSET_CONTENT_TYPE.to_string(),
        asset_url(&section.bundle),
    );

    let mut assets = Vec::with_capacity(section.assets.len());
    for (asset, hash) in section.assets.iter().zip(&hashes[1..]) {
        let content_type = content_type_for_extension(&asset.ext)
            .ok_or_else(|| ReleaseError::UnknownMimeType(asset.ext.clone()))?;
        assets.push(manifest_asset(
            hash,
            format!(".{}", normalize_extension(&asset.ext)),
            content_type,
            asset_url(&asset.path),
        ));
    }

    let mut extra = serde_json::Map::new();
    if let Some(app_config) = bundle.app_config().await? {
        extra.insert("expoClient".to_string(), app_config);
    }

    let id = release
        .update_id
        .map(|id| id.to_string())
        .ok_or_else(|| {
            ApiError::Internal(format!("release {} has no update id", release.path))
        })?;
    let created_at = release
        .timestamp
        .format(&Rfc3339)
        .map_err(|e| ApiError::Internal(format!("invalid release timestamp: {e}")))?;

    Ok(UpdateManifest {
        id,
        created_at,
        runtime_version: release.runtime_version.clone(),
        launch_asset,
        assets,
        metadata: serde_json::json!({}),
        extra: serde_json::Value::Object(extra),
    })
}

fn manifest_asset(
    hash: &ContentHash,
    file_extension: String,
    content_type: String,
    url: String,
) -> ManifestAsset {
    let hex = hash.to_hex();
    ManifestAsset {
        hash: hash.to_base64url(),
        key: hex[..32].to_string(),
        file_extension,
        content_type,
        url,
    }
}
