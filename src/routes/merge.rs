//! Merge endpoint
//!
//! POST /api/v1/merge — reassemble a previously split backup. The caller
//! names the ledger task whose attachments hold the parts and proves itself
//! with the shared API key; the response carries a download URL that stays
//! valid until the working directory's TTL deletion fires.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::reassembly::{MergedDownload, ReassemblyError, ReassemblyService};

/// Merge-specific state
#[derive(Clone)]
pub struct MergeState {
    pub service: ReassemblyService,
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub api_key: String,
    pub task_id: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

/// Merge error surfaced to HTTP clients
#[derive(Debug, thiserror::Error)]
pub enum MergeApiError {
    #[error("Invalid API key")]
    InvalidApiKey,

    #[error(transparent)]
    Reassembly(#[from] ReassemblyError),
}

impl MergeApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidApiKey => StatusCode::UNAUTHORIZED,
            Self::Reassembly(ReassemblyError::NoAttachments(_)) => StatusCode::NOT_FOUND,
            Self::Reassembly(ReassemblyError::Ledger(_)) => StatusCode::BAD_GATEWAY,
            Self::Reassembly(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MergeApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let code = match &self {
            Self::InvalidApiKey => "INVALID_API_KEY",
            Self::Reassembly(ReassemblyError::NoAttachments(_)) => "NO_ATTACHMENTS",
            Self::Reassembly(ReassemblyError::MergeFailed(_)) => "MERGE_FAILED",
            Self::Reassembly(ReassemblyError::Ledger(_)) => "LEDGER_ERROR",
            Self::Reassembly(ReassemblyError::Chunk(_)) => "MERGE_FAILED",
            Self::Reassembly(ReassemblyError::Io(_)) => "STORAGE_ERROR",
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

/// Create the merge router
pub fn router(state: MergeState) -> Router {
    Router::new()
        .route("/", post(merge))
        .with_state(state)
}

/// POST /api/v1/merge
async fn merge(
    State(state): State<MergeState>,
    Json(request): Json<MergeRequest>,
) -> Result<Json<MergedDownload>, MergeApiError> {
    if request.api_key != state.api_key {
        return Err(MergeApiError::InvalidApiKey);
    }

    tracing::info!(task_id = %request.task_id, "Merge requested");
    let download = state.service.reassemble(&request.task_id).await?;
    Ok(Json(download))
}
