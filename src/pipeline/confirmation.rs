use tokio::time::{interval, Instant, MissedTickBehavior};

use super::dispatcher::ShutdownSignal;
use super::driver::StepHandle;
use super::PipelineSettings;
use crate::{
    chain::{ChainClient, ChainReceipt},
    error::{AppError, PipelineError, Result},
    models::StepStatus,
};

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmationOutcome {
    Confirmed(ChainReceipt),
    Reverted(ChainReceipt),
    /// Receipt never showed up within the wait budget.
    Failed(PipelineError),
    /// Pipeline was swept or the process is shutting down.
    Abandoned,
}

/// Polls the chain until the submitted transaction has enough blocks on top.
pub struct ConfirmationTracker<'a> {
    client: &'a dyn ChainClient,
    settings: &'a PipelineSettings,
}

impl<'a> ConfirmationTracker<'a> {
    pub fn new(client: &'a dyn ChainClient, settings: &'a PipelineSettings) -> Self {
        Self { client, settings }
    }

    pub async fn track(
        &self,
        handle: &StepHandle<'_>,
        tx_hash: &str,
        shutdown: &mut ShutdownSignal,
    ) -> Result<ConfirmationOutcome> {
        if self.settings.confirmation_threshold == 0 {
            return self.await_inclusion(handle, tx_hash, shutdown).await;
        }

        let threshold = self.settings.confirmation_threshold;
        let started = Instant::now();
        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.triggered() => {
                    tracing::info!("Pipeline {} confirmation tracking stopped by shutdown", handle.pipeline_id());
                    return Ok(ConfirmationOutcome::Abandoned);
                }
            }

            let polled = match self.client.current_block_height().await {
                Ok(height) => self
                    .client
                    .receipt_for(tx_hash)
                    .await
                    .map(|receipt| (height, receipt)),
                Err(err) => Err(err),
            };
            let (height, receipt) = match polled {
                Ok(polled) => polled,
                Err(err) => {
                    let err = PipelineError::Poll(err.to_string());
                    tracing::warn!("Pipeline {} confirmation poll failed: {}", handle.pipeline_id(), err);
                    let reported = handle
                        .report(StepStatus::InProgress, |update| {
                            update.with("lastPollError", err.to_string())
                        })
                        .await;
                    if let Some(outcome) = abandoned_on_missing(reported)? {
                        return Ok(outcome);
                    }
                    continue;
                }
            };

            if let Some(receipt) = receipt.as_ref().filter(|receipt| !receipt.success) {
                return Ok(ConfirmationOutcome::Reverted(receipt.clone()));
            }

            let confirmed = receipt
                .as_ref()
                .and_then(|receipt| receipt.block_number)
                .map(|inclusion| height.saturating_sub(inclusion))
                .unwrap_or(0);
            let remaining = threshold.saturating_sub(confirmed);
            let message = if receipt.is_none() {
                "Waiting for the transaction to be included in a block".to_string()
            } else if remaining == 0 {
                format!("Confirmed with {} block(s)", confirmed)
            } else {
                format!("{} of {} confirmations, {} to go", confirmed, threshold, remaining)
            };

            let reported = handle
                .report(StepStatus::InProgress, |update| {
                    update
                        .with("confirmedBlocks", confirmed)
                        .with("remainingBlocks", remaining)
                        .with("elapsedSecs", started.elapsed().as_secs())
                        .with("message", message)
                })
                .await;
            if let Some(outcome) = abandoned_on_missing(reported)? {
                return Ok(outcome);
            }

            if remaining == 0 {
                if let Some(receipt) = receipt {
                    return Ok(ConfirmationOutcome::Confirmed(receipt));
                }
            }
        }
    }

    async fn await_inclusion(
        &self,
        handle: &StepHandle<'_>,
        tx_hash: &str,
        shutdown: &mut ShutdownSignal,
    ) -> Result<ConfirmationOutcome> {
        let reported = handle
            .report(StepStatus::InProgress, |update| {
                update.with("message", "Waiting for the transaction to be included in a block")
            })
            .await;
        if let Some(outcome) = abandoned_on_missing(reported)? {
            return Ok(outcome);
        }

        tokio::select! {
            receipt = self.client.await_receipt(tx_hash, self.settings.poll_interval) => {
                Ok(match receipt {
                    Ok(receipt) if receipt.success => ConfirmationOutcome::Confirmed(receipt),
                    Ok(receipt) => ConfirmationOutcome::Reverted(receipt),
                    Err(err) => ConfirmationOutcome::Failed(err),
                })
            }
            _ = shutdown.triggered() => Ok(ConfirmationOutcome::Abandoned),
        }
    }
}

// Internal helper that maps a swept pipeline to an abandoned outcome.
fn abandoned_on_missing<T>(reported: Result<T>) -> Result<Option<ConfirmationOutcome>> {
    match reported {
        Ok(_) => Ok(None),
        Err(AppError::NotFound(_)) => Ok(Some(ConfirmationOutcome::Abandoned)),
        Err(err) => Err(err),
    }
}
