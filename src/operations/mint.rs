use serde_json::{json, Value};

use super::{validate_address, WriteOperation};
use crate::{
    chain::{ChainAction, ChainReceipt},
    constants::MAX_TOKEN_URI_LEN,
    error::{AppError, Result},
    models::OperationKind,
    pipeline::{retrier::Submitted, ContractTarget},
};

/// Mints one game item to `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintItem {
    to: String,
    token_uri: String,
}

impl MintItem {
    pub fn new(to: &str, token_uri: &str) -> Result<Self> {
        let to = validate_address("to", to)?;
        let token_uri = token_uri.trim();
        if token_uri.is_empty() {
            return Err(AppError::BadRequest("tokenUri is required".to_string()));
        }
        if token_uri.len() > MAX_TOKEN_URI_LEN {
            return Err(AppError::BadRequest(format!(
                "tokenUri must be at most {} characters",
                MAX_TOKEN_URI_LEN
            )));
        }
        Ok(Self {
            to,
            token_uri: token_uri.to_string(),
        })
    }
}

impl WriteOperation for MintItem {
    fn kind(&self) -> OperationKind {
        OperationKind::Mint
    }

    fn id_prefix(&self) -> &'static str {
        "mint"
    }

    fn payload(&self) -> Value {
        json!({ "to": self.to, "tokenUri": self.token_uri })
    }

    fn target(&self) -> ContractTarget {
        ContractTarget::GameItems
    }

    fn action(&self) -> ChainAction {
        ChainAction::Mint {
            to: self.to.clone(),
            token_uri: self.token_uri.clone(),
        }
    }

    fn summarize(&self, submitted: &Submitted) -> Value {
        json!({
            "txHash": submitted.tx_hash,
            "referenceLink": submitted.reference_link,
            "contract": submitted.params.contract,
            "recipient": self.to,
            "tokenUri": self.token_uri,
        })
    }

    fn record_fields(&self, receipt: &ChainReceipt) -> Value {
        json!({
            "owner": self.to,
            "tokenUri": self.token_uri,
            "blockNumber": receipt.block_number,
            "gasUsed": receipt.gas_used,
        })
    }
}
