use axum::{extract::State, Json};
use serde::Serialize;

use super::AppState;
use crate::constants::API_VERSION;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub api_version: String,
    pub pipeline_store: String,
    pub record_store: String,
    pub in_flight_pipelines: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        api_version: API_VERSION.to_string(),
        pipeline_store: state.service.backend_name().to_string(),
        record_store: state.records_backend.to_string(),
        in_flight_pipelines: state.service.in_flight(),
    })
}
