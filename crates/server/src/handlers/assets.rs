//! Asset download endpoint.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

/// Assets are addressed by content inside immutable releases.
pub const ASSET_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetQuery {
    pub asset: Option<String>,
    pub runtime_version: Option<String>,
    pub platform: Option<String>,
}

/// GET /api/assets - Stream one asset of the active release.
pub async fn get_asset(
    State(state): State<AppState>,
    Query(query): Query<AssetQuery>,
) -> ApiResult<Response> {
    let runtime_version = query.runtime_version.as_deref().unwrap_or_default();
    let platform = query.platform.as_deref().unwrap_or_default();
    let asset_path = query.asset.as_deref().unwrap_or_default();

    let asset = state
        .assets
        .resolve_asset(runtime_version, platform, asset_path)
        .await
        .inspect_err(|e| {
            tracing::warn!(
                runtime_version,
                platform,
                asset = asset_path,
                error = %e,
                "Asset request failed"
            );
        })?;

    tracing::debug!(
        path = %asset.release.path,
        asset = %asset.asset_path,
        content_type = %asset.content_type,
        size_bytes = asset.size,
        "Serving asset"
    );

    let headers = [
        (CONTENT_TYPE, asset.content_type.clone()),
        (CONTENT_LENGTH, asset.size.to_string()),
        (CACHE_CONTROL, ASSET_CACHE_CONTROL.to_string()),
    ];
    Ok((StatusCode::OK, headers, Body::from_stream(asset.into_stream())).into_response())
}
