//! Write-operation pipeline: registry, step machine, submission retries,
//! confirmation tracking and the sync/async invocation surface.

pub mod confirmation;
pub mod dispatcher;
pub mod driver;
pub mod progress;
pub mod registry;
pub mod retrier;
pub mod runner;
pub mod service;
pub mod state_machine;
pub mod store;
pub mod sweep;

use std::time::Duration;

use crate::config::Config;

pub use dispatcher::Dispatcher;
pub use registry::PipelineRegistry;
pub use runner::PipelineRunner;
pub use service::PipelineService;
pub use store::{MemoryPipelineStore, PipelineStore, RedisPipelineStore};

/// Contracts a write operation can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractTarget {
    GameItems,
    DaoGovernor,
}

impl ContractTarget {
    pub fn setting_name(&self) -> &'static str {
        match self {
            ContractTarget::GameItems => "GAME_ITEMS_ADDRESS",
            ContractTarget::DaoGovernor => "DAO_GOVERNOR_ADDRESS",
        }
    }
}

/// Pipeline constants, fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub submit_timeout: Duration,
    pub default_gas_price_wei: u128,
    pub confirmation_threshold: u64,
    pub poll_interval: Duration,
    pub block_time_secs: u64,
    pub explorer_base_url: String,
    pub game_items_address: Option<String>,
    pub dao_governor_address: Option<String>,
    pub retention: chrono::Duration,
    pub sweep_interval: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.submission_max_attempts,
            backoff_base: config.submission_backoff_base(),
            submit_timeout: config.submission_timeout(),
            default_gas_price_wei: config.default_gas_price_wei,
            confirmation_threshold: config.confirmation_threshold,
            poll_interval: config.confirmation_poll_interval(),
            block_time_secs: config.block_time_secs,
            explorer_base_url: config.explorer_base_url.clone(),
            game_items_address: config.game_items_address.clone(),
            dao_governor_address: config.dao_governor_address.clone(),
            retention: config.pipeline_retention(),
            sweep_interval: config.pipeline_sweep_interval(),
        }
    }

    pub fn contract_address(&self, target: ContractTarget) -> Option<&str> {
        match target {
            ContractTarget::GameItems => self.game_items_address.as_deref(),
            ContractTarget::DaoGovernor => self.dao_governor_address.as_deref(),
        }
    }
}
