//! Bounded submission retries with exponential backoff.

use std::time::Duration;

use super::driver::StepHandle;
use super::PipelineSettings;
use crate::{
    chain::{ChainAction, ChainClient, SubmitParams},
    error::{PipelineError, Result},
    models::StepStatus,
    utils::explorer_tx_link,
};

pub const SUBMISSION_DELAYED: &str = "submission delayed, continuing in background";

/// Retry budget for the submission step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: settings.backoff_base,
        }
    }

    /// Delay before the attempt following `attempt` (1-indexed), or `None`
    /// once the budget is spent.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let multiplier = 2u32.saturating_pow(attempt.saturating_sub(1));
        Some(self.base_delay.saturating_mul(multiplier))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submitted {
    pub tx_hash: String,
    pub reference_link: String,
    pub attempts: u32,
    pub params: SubmitParams,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Submitted(Submitted),
    Failed { error: PipelineError, attempts: u32 },
}

pub struct SubmissionRetrier<'a> {
    client: &'a dyn ChainClient,
    settings: &'a PipelineSettings,
    sender: &'a str,
}

impl<'a> SubmissionRetrier<'a> {
    pub fn new(client: &'a dyn ChainClient, settings: &'a PipelineSettings, sender: &'a str) -> Self {
        Self {
            client,
            settings,
            sender,
        }
    }

    /// Runs submission attempts on the already started `submission` step.
    ///
    /// The caller owns the terminal transition; this only reports
    /// `IN_PROGRESS` and `RETRY` updates.
    pub async fn run(
        &self,
        handle: &StepHandle<'_>,
        action: &ChainAction,
        mut params: SubmitParams,
    ) -> Result<SubmissionOutcome> {
        let policy = RetryPolicy::from_settings(self.settings);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let mut warnings = Vec::new();
            if attempt > 1 {
                match self.client.next_sequence_number(self.sender).await {
                    Ok(nonce) => params.nonce = Some(nonce),
                    Err(err) => {
                        tracing::warn!(
                            "Pipeline {} nonce refresh failed before attempt {}: {}",
                            handle.pipeline_id(),
                            attempt,
                            err
                        );
                        warnings.push(format!("nonce refresh failed, reusing previous nonce: {}", err));
                    }
                }
                match self.client.fee_estimate().await {
                    Ok(gas_price) => params.gas_price_wei = Some(gas_price),
                    Err(err) => {
                        tracing::warn!(
                            "Pipeline {} fee refresh failed before attempt {}: {}",
                            handle.pipeline_id(),
                            attempt,
                            err
                        );
                        warnings.push(format!("fee refresh failed, reusing previous fee: {}", err));
                    }
                }
            }

            let nonce = params.nonce;
            let gas_price = params.gas_price_wei.map(|wei| wei.to_string());
            handle
                .report(StepStatus::InProgress, |update| {
                    let update = update
                        .attempts(attempt, policy.max_attempts)
                        .with("nonce", nonce)
                        .with("gasPriceWei", gas_price);
                    if warnings.is_empty() {
                        update
                    } else {
                        update.with("warning", warnings.join("; "))
                    }
                })
                .await?;

            let result = {
            let call = self.client.submit(action, &params);
            tokio::pin!(call);
            match tokio::time::timeout(self.settings.submit_timeout, &mut call).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        "Pipeline {} submission attempt {} exceeded {:?}, still waiting",
                        handle.pipeline_id(),
                        attempt,
                        self.settings.submit_timeout
                    );
                    handle
                        .report(StepStatus::InProgress, |update| {
                            update.with("warning", SUBMISSION_DELAYED)
                        })
                        .await?;
                    call.await
                }
            }
            };

            match result {
                Ok(tx_hash) => {
                    tracing::info!(
                        "Pipeline {} submitted tx={} attempt={}",
                        handle.pipeline_id(),
                        tx_hash,
                        attempt
                    );
                    let reference_link = explorer_tx_link(&self.settings.explorer_base_url, &tx_hash);
                    return Ok(SubmissionOutcome::Submitted(Submitted {
                        tx_hash,
                        reference_link,
                        attempts: attempt,
                        params,
                    }));
                }
                Err(error @ PipelineError::Configuration(_)) => {
                    return Ok(SubmissionOutcome::Failed {
                        error,
                        attempts: attempt,
                    });
                }
                Err(error) => {
                    let Some(delay) = policy.delay_after(attempt) else {
                        return Ok(SubmissionOutcome::Failed {
                            error,
                            attempts: attempt,
                        });
                    };
                    tracing::warn!(
                        "Pipeline {} submission attempt {}/{} failed ({}): {}",
                        handle.pipeline_id(),
                        attempt,
                        policy.max_attempts,
                        error.kind(),
                        error
                    );
                    handle
                        .report(StepStatus::Retry, |update| {
                            update
                                .with("lastError", error.to_string())
                                .with("errorKind", error.kind())
                                .with("nextRetryInMs", delay.as_millis() as u64)
                        })
                        .await?;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
