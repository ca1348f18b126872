use async_trait::async_trait;
use ethers::{
    abi::Detokenize,
    contract::ContractCall,
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, BlockNumber, TxHash, U256},
};
use std::str::FromStr;
use std::sync::Arc;

use super::{ChainAction, ChainClient, ChainReceipt, ChainResult, SubmitParams};
use crate::{config::Config, error::PipelineError, utils::looks_like_transient_rpc_error};

ethers::contract::abigen!(
    GameItems,
    r#"[
        function mint(address to, string tokenURI) returns (uint256)
    ]"#
);

ethers::contract::abigen!(
    DaoGovernor,
    r#"[
        function createProposal(string description, uint256 votingPeriod) returns (uint256)
        function vote(uint256 proposalId, bool support)
        function closeProposal(uint256 proposalId)
    ]"#
);

type SignedClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// JSON-RPC chain client for EVM networks.
pub struct EvmChainClient {
    provider: Provider<Http>,
    signer: Option<Arc<SignedClient>>,
    sender: Option<Address>,
}

impl EvmChainClient {
    pub fn from_config(config: &Config) -> ChainResult<Self> {
        let provider = Provider::<Http>::try_from(config.chain_rpc_url.as_str()).map_err(|e| {
            PipelineError::Configuration(format!("Invalid CHAIN_RPC_URL: {}", e))
        })?;

        let (signer, sender) = match config.signer_private_key.as_deref() {
            Some(key) => {
                let wallet = key
                    .trim()
                    .trim_start_matches("0x")
                    .parse::<LocalWallet>()
                    .map_err(|e| {
                        PipelineError::Configuration(format!("Invalid SIGNER_PRIVATE_KEY: {}", e))
                    })?
                    .with_chain_id(config.chain_id);
                let address = wallet.address();
                let client = SignerMiddleware::new(provider.clone(), wallet);
                (Some(Arc::new(client)), Some(address))
            }
            None => (None, None),
        };

        Ok(Self {
            provider,
            signer,
            sender,
        })
    }

    fn signed_client(&self) -> ChainResult<Arc<SignedClient>> {
        self.signer.clone().ok_or_else(|| {
            PipelineError::Configuration("SIGNER_PRIVATE_KEY is not configured".to_string())
        })
    }
}

// Internal helper that maps an RPC error message onto the pipeline taxonomy.
fn classify_rpc_error(message: String) -> PipelineError {
    if looks_like_transient_rpc_error(&message) {
        PipelineError::Network(message)
    } else {
        PipelineError::Submission(message)
    }
}

// Read failures always count as network failures.
fn read_error(err: impl std::fmt::Display) -> PipelineError {
    PipelineError::Network(err.to_string())
}

fn parse_address(value: &str) -> ChainResult<Address> {
    Address::from_str(value.trim())
        .map_err(|_| PipelineError::Submission(format!("Invalid EVM address: {}", value)))
}

fn parse_tx_hash(value: &str) -> ChainResult<TxHash> {
    TxHash::from_str(value.trim())
        .map_err(|_| PipelineError::Submission(format!("Invalid transaction hash: {}", value)))
}

async fn send_call<D>(call: ContractCall<SignedClient, D>, params: &SubmitParams) -> ChainResult<TxHash>
where
    D: Detokenize + Send + Sync,
{
    let mut call = call;
    if let Some(nonce) = params.nonce {
        call = call.nonce(nonce);
    }
    if let Some(gas_price) = params.gas_price_wei {
        call = call.legacy().gas_price(U256::from(gas_price));
    }
    let pending = call
        .send()
        .await
        .map_err(|e| classify_rpc_error(e.to_string()))?;
    Ok(pending.tx_hash())
}

#[async_trait]
impl ChainClient for EvmChainClient {
    fn sender_address(&self) -> Option<String> {
        self.sender.map(|address| format!("{:#x}", address))
    }

    async fn current_block_height(&self) -> ChainResult<u64> {
        let block = self.provider.get_block_number().await.map_err(read_error)?;
        Ok(block.as_u64())
    }

    async fn fee_estimate(&self) -> ChainResult<u128> {
        let gas_price = self.provider.get_gas_price().await.map_err(read_error)?;
        Ok(gas_price.low_u128())
    }

    async fn next_sequence_number(&self, address: &str) -> ChainResult<u64> {
        let address = parse_address(address)?;
        let nonce = self
            .provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(read_error)?;
        Ok(nonce.low_u64())
    }

    async fn submit(&self, action: &ChainAction, params: &SubmitParams) -> ChainResult<String> {
        let client = self.signed_client()?;
        let contract = parse_address(&params.contract)?;

        let tx_hash = match action {
            ChainAction::Mint { to, token_uri } => {
                let items = GameItems::new(contract, client);
                send_call(items.mint(parse_address(to)?, token_uri.clone()), params).await?
            }
            ChainAction::CreateProposal {
                description,
                voting_period_secs,
            } => {
                let dao = DaoGovernor::new(contract, client);
                let call =
                    dao.create_proposal(description.clone(), U256::from(*voting_period_secs));
                send_call(call, params).await?
            }
            ChainAction::Vote {
                proposal_id,
                support,
            } => {
                let dao = DaoGovernor::new(contract, client);
                send_call(dao.vote(U256::from(*proposal_id), *support), params).await?
            }
            ChainAction::CloseProposal { proposal_id } => {
                let dao = DaoGovernor::new(contract, client);
                send_call(dao.close_proposal(U256::from(*proposal_id)), params).await?
            }
        };

        Ok(format!("{:#x}", tx_hash))
    }

    async fn receipt_for(&self, tx_hash: &str) -> ChainResult<Option<ChainReceipt>> {
        let hash = parse_tx_hash(tx_hash)?;
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(read_error)?;

        Ok(receipt.map(|receipt| ChainReceipt {
            tx_hash: tx_hash.to_string(),
            block_number: receipt.block_number.map(|block| block.as_u64()),
            gas_used: receipt.gas_used.map(|gas| gas.low_u64()),
            // Pre-byzantium receipts carry no status field
            success: receipt.status.map(|status| status.as_u64() == 1).unwrap_or(true),
        }))
    }
}
