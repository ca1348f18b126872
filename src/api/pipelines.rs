use axum::{
    extract::{Path, State},
    Json,
};

use super::AppState;
use crate::{
    error::{AppError, Result},
    models::ApiResponse,
    pipeline::service::{PipelineStatusView, PipelineSummary},
};

/// GET /api/v1/pipelines/{request_id}
pub async fn get_status(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<ApiResponse<PipelineStatusView>>> {
    let view = state
        .service
        .status(&request_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Pipeline {} not found", request_id)))?;
    Ok(Json(ApiResponse::success(view)))
}

/// GET /api/v1/pipelines
pub async fn list(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<PipelineSummary>>>> {
    Ok(Json(ApiResponse::success(state.service.list().await?)))
}
