use serde_json::{json, Value};

use super::WriteOperation;
use crate::{
    chain::{ChainAction, ChainReceipt},
    constants::{DEFAULT_VOTING_PERIOD_SECS, MAX_PROPOSAL_DESCRIPTION_LEN},
    error::{AppError, Result},
    models::OperationKind,
    pipeline::ContractTarget,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateProposal {
    description: String,
    voting_period_secs: u64,
}

impl CreateProposal {
    pub fn new(description: &str, voting_period_secs: Option<u64>) -> Result<Self> {
        let description = description.trim();
        if description.is_empty() {
            return Err(AppError::BadRequest("description is required".to_string()));
        }
        if description.chars().count() > MAX_PROPOSAL_DESCRIPTION_LEN {
            return Err(AppError::BadRequest(format!(
                "description must be at most {} characters",
                MAX_PROPOSAL_DESCRIPTION_LEN
            )));
        }
        let voting_period_secs = voting_period_secs.unwrap_or(DEFAULT_VOTING_PERIOD_SECS);
        if voting_period_secs == 0 {
            return Err(AppError::BadRequest(
                "votingPeriodSecs must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            description: description.to_string(),
            voting_period_secs,
        })
    }
}

impl WriteOperation for CreateProposal {
    fn kind(&self) -> OperationKind {
        OperationKind::CreateProposal
    }

    fn id_prefix(&self) -> &'static str {
        "proposal"
    }

    fn payload(&self) -> Value {
        json!({
            "description": self.description,
            "votingPeriodSecs": self.voting_period_secs,
        })
    }

    fn target(&self) -> ContractTarget {
        ContractTarget::DaoGovernor
    }

    fn action(&self) -> ChainAction {
        ChainAction::CreateProposal {
            description: self.description.clone(),
            voting_period_secs: self.voting_period_secs,
        }
    }

    fn record_fields(&self, receipt: &ChainReceipt) -> Value {
        json!({
            "description": self.description,
            "votingPeriodSecs": self.voting_period_secs,
            "blockNumber": receipt.block_number,
            "gasUsed": receipt.gas_used,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastVote {
    proposal_id: u64,
    support: bool,
}

impl CastVote {
    pub fn new(proposal_id: u64, support: bool) -> Self {
        Self {
            proposal_id,
            support,
        }
    }
}

impl WriteOperation for CastVote {
    fn kind(&self) -> OperationKind {
        OperationKind::Vote
    }

    fn id_prefix(&self) -> &'static str {
        "vote"
    }

    fn payload(&self) -> Value {
        json!({ "proposalId": self.proposal_id, "support": self.support })
    }

    fn target(&self) -> ContractTarget {
        ContractTarget::DaoGovernor
    }

    fn action(&self) -> ChainAction {
        ChainAction::Vote {
            proposal_id: self.proposal_id,
            support: self.support,
        }
    }

    fn record_fields(&self, receipt: &ChainReceipt) -> Value {
        json!({
            "proposalId": self.proposal_id,
            "support": self.support,
            "blockNumber": receipt.block_number,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseProposal {
    proposal_id: u64,
}

impl CloseProposal {
    pub fn new(proposal_id: u64) -> Self {
        Self { proposal_id }
    }
}

impl WriteOperation for CloseProposal {
    fn kind(&self) -> OperationKind {
        OperationKind::CloseProposal
    }

    fn id_prefix(&self) -> &'static str {
        "close"
    }

    fn payload(&self) -> Value {
        json!({ "proposalId": self.proposal_id })
    }

    fn target(&self) -> ContractTarget {
        ContractTarget::DaoGovernor
    }

    fn action(&self) -> ChainAction {
        ChainAction::CloseProposal {
            proposal_id: self.proposal_id,
        }
    }

    fn record_fields(&self, receipt: &ChainReceipt) -> Value {
        json!({
            "proposalId": self.proposal_id,
            "closed": true,
            "blockNumber": receipt.block_number,
        })
    }
}
