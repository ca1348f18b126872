/// Application constants

pub const API_VERSION: &str = "v1";

// Submission retry
pub const DEFAULT_SUBMISSION_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_SUBMISSION_BACKOFF_BASE_MS: u64 = 2_000;
pub const DEFAULT_SUBMISSION_TIMEOUT_SECS: u64 = 30;

// Confirmation tracking
pub const DEFAULT_CONFIRMATION_THRESHOLD: u64 = 2;
pub const DEFAULT_CONFIRMATION_POLL_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_BLOCK_TIME_SECS: u64 = 12;
pub const RECEIPT_WAIT_MAX_POLLS: usize = 240;

// Fee fallback when the node cannot estimate (20 gwei)
pub const DEFAULT_GAS_PRICE_WEI: u128 = 20_000_000_000;

// Registry retention
pub const DEFAULT_PIPELINE_RETENTION_HOURS: i64 = 24;
pub const DEFAULT_PIPELINE_SWEEP_INTERVAL_SECS: u64 = 3_600;

// Admission
pub const DEFAULT_MAX_INFLIGHT_PIPELINES: usize = 64;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

// DAO
pub const DEFAULT_VOTING_PERIOD_SECS: u64 = 3 * 24 * 3_600;
pub const MAX_PROPOSAL_DESCRIPTION_LEN: usize = 2_000;
pub const MAX_TOKEN_URI_LEN: usize = 512;

pub const DEFAULT_EXPLORER_BASE_URL: &str = "https://etherscan.io";
pub const PIPELINE_STATUS_PATH: &str = "/api/v1/pipelines";
