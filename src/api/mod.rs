// src/api/mod.rs

pub mod dao;
pub mod health;
pub mod nft;
pub mod pipelines;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::{
    config::Config, error::Result, models::ApiResponse, operations::WriteOperation,
    pipeline::PipelineService,
};

// AppState definition
#[derive(Clone)]
pub struct AppState {
    pub service: PipelineService,
    pub config: Config,
    pub records_backend: &'static str,
}

/// Runs `op` the way the caller asked: 200 with the submission result, or
/// 202 with a status handle when `process_async` is set.
pub async fn dispatch(
    state: &AppState,
    op: Arc<dyn WriteOperation>,
    process_async: bool,
) -> Result<Response> {
    if process_async {
        let accepted = state.service.submit_async(op).await?;
        Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(accepted))).into_response())
    } else {
        let submission = state.service.submit_sync(op).await?;
        Ok(Json(ApiResponse::success(submission)).into_response())
    }
}
