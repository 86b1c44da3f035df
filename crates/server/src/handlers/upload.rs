//! Release upload endpoint.

use crate::error::{ApiError, ApiResult};
use crate::releases::Upload;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Multipart, State};
use serde::Serialize;
use updraft_core::UpdateId;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub path: String,
    pub update_id: Option<UpdateId>,
}

/// POST /api/upload - Ingest a bundle from a multipart form.
///
/// Fields: `file`, `runtimeVersion`, `commitHash` and optional `commitMessage`.
pub async fn upload_release(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut upload = Upload::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => upload.archive = field.bytes().await?,
            "runtimeVersion" => upload.runtime_version = field.text().await?,
            "commitHash" => upload.commit_hash = field.text().await?,
            "commitMessage" => upload.commit_message = Some(field.text().await?),
            other => {
                tracing::debug!(field = other, "Ignoring unknown upload field");
            }
        }
    }

    let release = state.ingest.ingest(upload).await.map_err(ApiError::from)?;

    Ok(Json(UploadResponse {
        success: true,
        path: release.path,
        update_id: release.update_id,
    }))
}
