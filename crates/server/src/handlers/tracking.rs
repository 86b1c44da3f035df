//! Download tracking endpoints.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use updraft_metadata::models::TrackingMetric;

#[derive(Debug, Serialize)]
pub struct Tracking {
    pub platform: String,
    pub count: i64,
}

impl From<TrackingMetric> for Tracking {
    fn from(metric: TrackingMetric) -> Self {
        Self {
            platform: metric.platform,
            count: metric.count,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllTrackingResponse {
    pub trackings: Vec<Tracking>,
    pub total_releases: usize,
}

/// GET /api/tracking/all - Downloads per platform across all releases.
pub async fn all_tracking(State(state): State<AppState>) -> ApiResult<Json<AllTrackingResponse>> {
    let trackings = state
        .metadata
        .get_release_tracking_metrics_for_all_releases()
        .await?;
    let total_releases = state.metadata.list_releases().await?.len();

    Ok(Json(AllTrackingResponse {
        trackings: trackings.into_iter().map(Tracking::from).collect(),
        total_releases,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ReleaseTrackingQuery {
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReleaseTrackingResponse {
    pub path: String,
    pub trackings: Vec<Tracking>,
}

/// GET /api/tracking/release?path= - Downloads per platform for one release.
pub async fn release_tracking(
    State(state): State<AppState>,
    Query(query): Query<ReleaseTrackingQuery>,
) -> ApiResult<Json<ReleaseTrackingResponse>> {
    let path = query
        .path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing release path".to_string()))?;

    let release = state
        .metadata
        .get_release_by_path(&path)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("release not recorded: {path}")))?;
    let trackings = state
        .metadata
        .get_release_tracking_metrics(release.release_id)
        .await?;

    Ok(Json(ReleaseTrackingResponse {
        path,
        trackings: trackings.into_iter().map(Tracking::from).collect(),
    }))
}
