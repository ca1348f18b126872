use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_BLOCK_TIME_SECS, DEFAULT_CONFIRMATION_POLL_INTERVAL_SECS,
    DEFAULT_CONFIRMATION_THRESHOLD, DEFAULT_EXPLORER_BASE_URL, DEFAULT_GAS_PRICE_WEI,
    DEFAULT_MAX_INFLIGHT_PIPELINES, DEFAULT_PIPELINE_RETENTION_HOURS,
    DEFAULT_PIPELINE_SWEEP_INTERVAL_SECS, DEFAULT_SHUTDOWN_GRACE_SECS,
    DEFAULT_SUBMISSION_BACKOFF_BASE_MS, DEFAULT_SUBMISSION_MAX_ATTEMPTS,
    DEFAULT_SUBMISSION_TIMEOUT_SECS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum StoreBackend {
    Memory,
    Redis,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "memory" => Ok(StoreBackend::Memory),
            "redis" => Ok(StoreBackend::Redis),
            other => anyhow::bail!("Unknown PIPELINE_STORE backend: {}", other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Chain
    pub chain_rpc_url: String,
    pub chain_id: u64,
    pub signer_private_key: Option<String>,
    pub explorer_base_url: String,

    // Contract addresses
    pub game_items_address: Option<String>,
    pub dao_governor_address: Option<String>,

    // Submission
    pub submission_max_attempts: u32,
    pub submission_backoff_base_ms: u64,
    pub submission_timeout_secs: u64,
    pub default_gas_price_wei: u128,

    // Confirmation
    pub confirmation_threshold: u64,
    pub confirmation_poll_interval_secs: u64,
    pub block_time_secs: u64,

    // Registry
    pub pipeline_store: StoreBackend,
    pub redis_url: String,
    pub pipeline_retention_hours: i64,
    pub pipeline_sweep_interval_secs: u64,
    pub max_inflight_pipelines: usize,
    pub shutdown_grace_secs: u64,

    // Records
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // CORS
    pub cors_allowed_origins: String,
}

// Internal helper that reads an optional, non-empty env value.
fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

// Internal helper that parses an env value or falls back to a default.
fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid {}={}: {}", name, raw, e)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_var("PORT", 3000)?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            chain_rpc_url: env::var("CHAIN_RPC_URL")
                .map_err(|_| anyhow::anyhow!("Missing CHAIN_RPC_URL in env."))?,
            chain_id: parse_var("CHAIN_ID", 31_337)?,
            signer_private_key: optional_var("SIGNER_PRIVATE_KEY"),
            explorer_base_url: optional_var("EXPLORER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_EXPLORER_BASE_URL.to_string()),

            game_items_address: optional_var("GAME_ITEMS_ADDRESS"),
            dao_governor_address: optional_var("DAO_GOVERNOR_ADDRESS"),

            submission_max_attempts: parse_var(
                "SUBMISSION_MAX_ATTEMPTS",
                DEFAULT_SUBMISSION_MAX_ATTEMPTS,
            )?,
            submission_backoff_base_ms: parse_var(
                "SUBMISSION_BACKOFF_BASE_MS",
                DEFAULT_SUBMISSION_BACKOFF_BASE_MS,
            )?,
            submission_timeout_secs: parse_var(
                "SUBMISSION_TIMEOUT_SECS",
                DEFAULT_SUBMISSION_TIMEOUT_SECS,
            )?,
            default_gas_price_wei: parse_var("DEFAULT_GAS_PRICE_WEI", DEFAULT_GAS_PRICE_WEI)?,

            confirmation_threshold: parse_var(
                "CONFIRMATION_THRESHOLD",
                DEFAULT_CONFIRMATION_THRESHOLD,
            )?,
            confirmation_poll_interval_secs: parse_var(
                "CONFIRMATION_POLL_INTERVAL_SECS",
                DEFAULT_CONFIRMATION_POLL_INTERVAL_SECS,
            )?,
            block_time_secs: parse_var("BLOCK_TIME_SECS", DEFAULT_BLOCK_TIME_SECS)?,

            pipeline_store: parse_var("PIPELINE_STORE", StoreBackend::Memory)?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            pipeline_retention_hours: parse_var(
                "PIPELINE_RETENTION_HOURS",
                DEFAULT_PIPELINE_RETENTION_HOURS,
            )?,
            pipeline_sweep_interval_secs: parse_var(
                "PIPELINE_SWEEP_INTERVAL_SECS",
                DEFAULT_PIPELINE_SWEEP_INTERVAL_SECS,
            )?,
            max_inflight_pipelines: parse_var(
                "MAX_INFLIGHT_PIPELINES",
                DEFAULT_MAX_INFLIGHT_PIPELINES,
            )?,
            shutdown_grace_secs: parse_var("SHUTDOWN_GRACE_SECS", DEFAULT_SHUTDOWN_GRACE_SECS)?,

            database_url: optional_var("DATABASE_URL"),
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chain_rpc_url.trim().is_empty() {
            anyhow::bail!("CHAIN_RPC_URL is empty");
        }
        url::Url::parse(&self.chain_rpc_url)
            .map_err(|e| anyhow::anyhow!("Invalid CHAIN_RPC_URL: {}", e))?;
        if self.submission_max_attempts == 0 {
            anyhow::bail!("SUBMISSION_MAX_ATTEMPTS must be > 0");
        }
        if self.confirmation_poll_interval_secs == 0 {
            anyhow::bail!("CONFIRMATION_POLL_INTERVAL_SECS must be > 0");
        }
        if self.pipeline_sweep_interval_secs == 0 {
            anyhow::bail!("PIPELINE_SWEEP_INTERVAL_SECS must be > 0");
        }
        if self.max_inflight_pipelines == 0 {
            anyhow::bail!("MAX_INFLIGHT_PIPELINES must be > 0");
        }
        if self.pipeline_retention_hours < 0 {
            anyhow::bail!("PIPELINE_RETENTION_HOURS must not be negative");
        }

        if self.signer_private_key.is_none() {
            tracing::warn!("SIGNER_PRIVATE_KEY is not set; write operations will fail at initialization");
        }
        for (name, address) in [
            ("GAME_ITEMS_ADDRESS", &self.game_items_address),
            ("DAO_GOVERNOR_ADDRESS", &self.dao_governor_address),
        ] {
            match address.as_deref() {
                None => tracing::warn!("{} is not set", name),
                Some(addr) if addr.starts_with("0x0000") => {
                    tracing::warn!("Using placeholder {}", name)
                }
                Some(_) => {}
            }
        }
        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; requests may be blocked");
        }

        Ok(())
    }

    pub fn is_testnet(&self) -> bool {
        self.environment == "development" || self.environment == "testnet"
    }

    pub fn submission_backoff_base(&self) -> Duration {
        Duration::from_millis(self.submission_backoff_base_ms)
    }

    pub fn submission_timeout(&self) -> Duration {
        Duration::from_secs(self.submission_timeout_secs)
    }

    pub fn confirmation_poll_interval(&self) -> Duration {
        Duration::from_secs(self.confirmation_poll_interval_secs)
    }

    pub fn pipeline_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.pipeline_sweep_interval_secs)
    }

    pub fn pipeline_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.pipeline_retention_hours)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 3000,
        environment: "development".to_string(),
        chain_rpc_url: "http://localhost:8545".to_string(),
        chain_id: 31_337,
        signer_private_key: Some(
            "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".to_string(),
        ),
        explorer_base_url: "https://explorer.test".to_string(),
        game_items_address: Some("0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string()),
        dao_governor_address: Some("0xe7f1725e7734ce288f8367e1bb143e90bb3f0512".to_string()),
        submission_max_attempts: 3,
        submission_backoff_base_ms: 2_000,
        submission_timeout_secs: 30,
        default_gas_price_wei: DEFAULT_GAS_PRICE_WEI,
        confirmation_threshold: 2,
        confirmation_poll_interval_secs: 15,
        block_time_secs: 12,
        pipeline_store: StoreBackend::Memory,
        redis_url: "redis://localhost:6379".to_string(),
        pipeline_retention_hours: 24,
        pipeline_sweep_interval_secs: 3_600,
        max_inflight_pipelines: 8,
        shutdown_grace_secs: 5,
        database_url: None,
        database_max_connections: 1,
        cors_allowed_origins: "*".to_string(),
    }
}
