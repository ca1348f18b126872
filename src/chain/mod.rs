//! Chain collaborator used by the write-operation pipeline.
//!
//! The pipeline only needs block height, fee and nonce lookups, an opaque
//! "submit signed write call" and receipt queries. `EvmChainClient` is the
//! JSON-RPC implementation; tests use the scripted client in `testing`.

pub mod evm;
#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::constants::RECEIPT_WAIT_MAX_POLLS;
use crate::error::PipelineError;

pub use evm::EvmChainClient;

pub type ChainResult<T> = std::result::Result<T, PipelineError>;

/// Contract write call, opaque to the pipeline engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ChainAction {
    #[serde(rename_all = "camelCase")]
    Mint { to: String, token_uri: String },
    #[serde(rename_all = "camelCase")]
    CreateProposal {
        description: String,
        voting_period_secs: u64,
    },
    #[serde(rename_all = "camelCase")]
    Vote { proposal_id: u64, support: bool },
    #[serde(rename_all = "camelCase")]
    CloseProposal { proposal_id: u64 },
}

/// Parameters resolved by the setup steps; refreshed between attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitParams {
    pub contract: String,
    pub nonce: Option<u64>,
    pub gas_price_wei: Option<u128>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainReceipt {
    pub tx_hash: String,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    pub success: bool,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Address of the configured signer, `None` when no signing key is loaded.
    fn sender_address(&self) -> Option<String>;

    async fn current_block_height(&self) -> ChainResult<u64>;

    /// Current gas price in wei.
    async fn fee_estimate(&self) -> ChainResult<u128>;

    /// Next usable nonce for `address`, pending transactions included.
    async fn next_sequence_number(&self, address: &str) -> ChainResult<u64>;

    /// Signs and broadcasts the call, returning the transaction hash.
    async fn submit(&self, action: &ChainAction, params: &SubmitParams) -> ChainResult<String>;

    async fn receipt_for(&self, tx_hash: &str) -> ChainResult<Option<ChainReceipt>>;

    /// Polls `receipt_for` until the transaction is included.
    async fn await_receipt(
        &self,
        tx_hash: &str,
        poll_interval: Duration,
    ) -> ChainResult<ChainReceipt> {
        let mut last_error = String::from("receipt not available yet");
        for attempt in 0..RECEIPT_WAIT_MAX_POLLS {
            match self.receipt_for(tx_hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!("await_receipt poll failed tx={} err={}", tx_hash, err);
                    last_error = err.to_string();
                }
            }
            if attempt + 1 < RECEIPT_WAIT_MAX_POLLS {
                tokio::time::sleep(poll_interval).await;
            }
        }
        Err(PipelineError::Network(format!(
            "Transaction {} not included after {} polls: {}",
            tx_hash, RECEIPT_WAIT_MAX_POLLS, last_error
        )))
    }
}
