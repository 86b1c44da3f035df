//! Release listing and rollback endpoints.

use crate::error::ApiResult;
use crate::releases::RuntimeSummary;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use updraft_core::Release;

#[derive(Debug, Serialize)]
pub struct ReleasesResponse {
    pub releases: Vec<Release>,
}

/// GET /api/releases - Every stored release, grouped by runtime version.
pub async fn list_releases(State(state): State<AppState>) -> ApiResult<Json<ReleasesResponse>> {
    let releases = state.releases.list_all_releases().await?;
    Ok(Json(ReleasesResponse { releases }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSummariesResponse {
    pub runtime_summaries: Vec<RuntimeSummary>,
}

/// GET /api/releases-by-runtime - Active release and count per runtime version.
pub async fn releases_by_runtime(
    State(state): State<AppState>,
) -> ApiResult<Json<RuntimeSummariesResponse>> {
    let runtime_summaries = state.releases.runtime_summaries().await?;
    Ok(Json(RuntimeSummariesResponse { runtime_summaries }))
}

#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackResponse {
    pub success: bool,
    pub path: String,
    pub runtime_version: String,
    pub previous_path: Option<String>,
}

/// POST /api/rollback - Make an older release active for its runtime version.
pub async fn rollback(
    State(state): State<AppState>,
    Json(request): Json<RollbackRequest>,
) -> ApiResult<Json<RollbackResponse>> {
    let outcome = state
        .releases
        .rollback(&request.path)
        .await
        .inspect_err(|e| tracing::warn!(path = %request.path, error = %e, "Rollback rejected"))?;

    Ok(Json(RollbackResponse {
        success: true,
        path: outcome.path,
        runtime_version: outcome.runtime_version,
        previous_path: outcome.previous_path,
    }))
}
