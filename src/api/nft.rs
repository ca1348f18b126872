use axum::{extract::State, response::Response, Json};
use serde::Deserialize;
use std::sync::Arc;

use super::{dispatch, AppState};
use crate::{error::Result, operations::MintItem};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    pub to: String,
    pub token_uri: String,
    #[serde(default)]
    pub process_async: bool,
}

/// POST /api/v1/nft/mint
pub async fn mint(State(state): State<AppState>, Json(req): Json<MintRequest>) -> Result<Response> {
    let op = MintItem::new(&req.to, &req.token_uri)?;
    tracing::info!("Mint requested to={} async={}", req.to, req.process_async);
    dispatch(&state, Arc::new(op), req.process_async).await
}
