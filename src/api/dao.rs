use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{dispatch, AppState};
use crate::{
    error::Result,
    operations::{CastVote, CloseProposal, CreateProposal},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProposalRequest {
    pub description: String,
    pub voting_period_secs: Option<u64>,
    #[serde(default)]
    pub process_async: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub support: bool,
    #[serde(default)]
    pub process_async: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseProposalRequest {
    #[serde(default)]
    pub process_async: bool,
}

/// POST /api/v1/dao/proposals
pub async fn create_proposal(
    State(state): State<AppState>,
    Json(req): Json<CreateProposalRequest>,
) -> Result<Response> {
    let op = CreateProposal::new(&req.description, req.voting_period_secs)?;
    dispatch(&state, Arc::new(op), req.process_async).await
}

/// POST /api/v1/dao/proposals/{proposal_id}/vote
pub async fn vote(
    State(state): State<AppState>,
    Path(proposal_id): Path<u64>,
    Json(req): Json<VoteRequest>,
) -> Result<Response> {
    tracing::info!("Vote requested proposal={} support={}", proposal_id, req.support);
    dispatch(
        &state,
        Arc::new(CastVote::new(proposal_id, req.support)),
        req.process_async,
    )
    .await
}

/// POST /api/v1/dao/proposals/{proposal_id}/close
pub async fn close_proposal(
    State(state): State<AppState>,
    Path(proposal_id): Path<u64>,
    body: Option<Json<CloseProposalRequest>>,
) -> Result<Response> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    dispatch(
        &state,
        Arc::new(CloseProposal::new(proposal_id)),
        req.process_async,
    )
    .await
}
