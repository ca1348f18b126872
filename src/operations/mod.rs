//! Write operations the pipeline can carry.
//!
//! Each operation validates its own input, names the contract it targets and
//! turns itself into a `ChainAction`. The runner handles everything else.

pub mod mint;
pub mod proposal;

use serde_json::{json, Value};

use crate::{
    chain::{ChainAction, ChainReceipt},
    models::OperationKind,
    pipeline::{retrier::Submitted, ContractTarget},
};

pub use mint::MintItem;
pub use proposal::{CastVote, CloseProposal, CreateProposal};

pub trait WriteOperation: Send + Sync {
    fn kind(&self) -> OperationKind;

    /// Prefix of generated request ids.
    fn id_prefix(&self) -> &'static str;

    /// Request payload as stored on the pipeline.
    fn payload(&self) -> Value;

    fn target(&self) -> ContractTarget;

    fn action(&self) -> ChainAction;

    /// Terminal `result` of a submitted pipeline.
    fn summarize(&self, submitted: &Submitted) -> Value {
        json!({
            "txHash": submitted.tx_hash,
            "referenceLink": submitted.reference_link,
            "contract": submitted.params.contract,
        })
    }

    /// Fields merged into the chain record once the receipt is final.
    fn record_fields(&self, receipt: &ChainReceipt) -> Value {
        json!({
            "blockNumber": receipt.block_number,
            "gasUsed": receipt.gas_used,
        })
    }
}

// Internal helper that validates an EVM address string.
pub(crate) fn validate_address(field: &str, value: &str) -> crate::error::Result<String> {
    let value = value.trim();
    let hex_part = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or("");
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(crate::error::AppError::BadRequest(format!(
            "{} must be a 0x-prefixed 20-byte hex address",
            field
        )));
    }
    Ok(format!("0x{}", hex_part.to_ascii_lowercase()))
}
