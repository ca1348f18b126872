//! One generic driver for every write operation.

use std::sync::Arc;

use super::confirmation::{ConfirmationOutcome, ConfirmationTracker};
use super::dispatcher::ShutdownSignal;
use super::driver::StepDriver;
use super::registry::PipelineRegistry;
use super::retrier::{SubmissionOutcome, SubmissionRetrier, Submitted};
use super::state_machine::PipelineUpdate;
use super::PipelineSettings;
use crate::{
    chain::{ChainClient, SubmitParams},
    db::{ChainRecord, RecordStore, RECORD_STATUS_CONFIRMED, RECORD_STATUS_REVERTED},
    error::{AppError, PipelineError, Result},
    operations::{validate_address, WriteOperation},
};

/// Where a pipeline stands once `submission` is terminal.
pub enum SubmissionStage {
    /// Carries the driver positioned at `confirmation`.
    Submitted {
        driver: StepDriver,
        submitted: Submitted,
    },
    Failed {
        error: PipelineError,
        attempts: u32,
    },
}

#[derive(Clone)]
pub struct PipelineRunner {
    registry: Arc<PipelineRegistry>,
    client: Arc<dyn ChainClient>,
    records: Arc<dyn RecordStore>,
    settings: Arc<PipelineSettings>,
}

impl PipelineRunner {
    pub fn new(
        registry: Arc<PipelineRegistry>,
        client: Arc<dyn ChainClient>,
        records: Arc<dyn RecordStore>,
        settings: Arc<PipelineSettings>,
    ) -> Self {
        Self {
            registry,
            client,
            records,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<PipelineRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs the setup steps and the submission step.
    pub async fn run_until_submitted(
        &self,
        op: &dyn WriteOperation,
        id: &str,
    ) -> Result<SubmissionStage> {
        let mut driver = StepDriver::new(self.registry.clone(), id);

        // initialization
        let step = driver.begin().await?;
        let Some(sender) = self.client.sender_address() else {
            let error = PipelineError::Configuration("SIGNER_PRIVATE_KEY is not configured".to_string());
            step.fail(&error.to_string(), |u| u.with("errorKind", error.kind()))
                .await?;
            return Ok(SubmissionStage::Failed { error, attempts: 0 });
        };
        step.complete(|u| {
            u.with("sender", sender.as_str())
                .with("operation", op.kind().as_str())
        })
        .await?;

        // providerSetup
        let step = driver.begin().await?;
        match self.client.current_block_height().await {
            Ok(height) => step.complete(|u| u.with("blockHeight", height)).await?,
            Err(err) => {
                tracing::warn!("Pipeline {} provider probe failed: {}", id, err);
                step.complete(|u| u.with("warning", format!("provider probe failed: {}", err)))
                    .await?
            }
        };

        // contractSetup
        let step = driver.begin().await?;
        let target = op.target();
        let contract = match self.settings.contract_address(target) {
            Some(address) => validate_address(target.setting_name(), address).map_err(|_| {
                PipelineError::Configuration(format!("{} is not a valid address", target.setting_name()))
            }),
            None => Err(PipelineError::Configuration(format!(
                "{} is not configured",
                target.setting_name()
            ))),
        };
        let contract = match contract {
            Ok(contract) => contract,
            Err(error) => {
                step.fail(&error.to_string(), |u| u.with("errorKind", error.kind()))
                    .await?;
                return Ok(SubmissionStage::Failed { error, attempts: 0 });
            }
        };
        step.complete(|u| u.with("contract", contract.as_str())).await?;

        // feeEstimation
        let step = driver.begin().await?;
        let gas_price_wei = match self.client.fee_estimate().await {
            Ok(price) => {
                step.complete(|u| {
                    u.with("gasPriceWei", price.to_string())
                        .with("source", "node")
                })
                .await?;
                price
            }
            Err(err) => {
                tracing::warn!("Pipeline {} fee estimation failed, using default: {}", id, err);
                let price = self.settings.default_gas_price_wei;
                step.complete(|u| {
                    u.with("gasPriceWei", price.to_string())
                        .with("source", "default")
                        .with("warning", format!("fee estimation failed: {}", err))
                })
                .await?;
                price
            }
        };

        // nonceSetup
        let step = driver.begin().await?;
        let nonce = match self.client.next_sequence_number(&sender).await {
            Ok(nonce) => {
                step.complete(|u| u.with("nonce", nonce)).await?;
                Some(nonce)
            }
            Err(err) => {
                tracing::warn!("Pipeline {} nonce lookup failed: {}", id, err);
                step.complete(|u| {
                    u.with(
                        "warning",
                        format!("nonce lookup failed, node will assign nonce: {}", err),
                    )
                })
                .await?;
                None
            }
        };

        // submission
        let step = driver.begin().await?;
        let params = SubmitParams {
            contract,
            nonce,
            gas_price_wei: Some(gas_price_wei),
        };
        let outcome = SubmissionRetrier::new(self.client.as_ref(), &self.settings, &sender)
            .run(&step, &op.action(), params)
            .await?;
        let max_attempts = self.settings.max_attempts.max(1);

        match outcome {
            SubmissionOutcome::Submitted(submitted) => {
                step.complete(|u| {
                    u.attempts(submitted.attempts, max_attempts)
                        .with("txHash", submitted.tx_hash.as_str())
                        .with("referenceLink", submitted.reference_link.as_str())
                })
                .await?;
                self.registry
                    .apply(id, PipelineUpdate::Result(op.summarize(&submitted)))
                    .await?;

                let record = ChainRecord::submitted(id, op.kind().as_str(), &submitted.tx_hash, op.payload());
                if let Err(err) = self.records.save(&record).await {
                    tracing::warn!("Failed to save chain record {}: {}", id, err);
                }

                Ok(SubmissionStage::Submitted { driver, submitted })
            }
            SubmissionOutcome::Failed { error, attempts } => {
                step.fail(&error.to_string(), |u| {
                    u.attempts(attempts, max_attempts)
                        .with("errorKind", error.kind())
                })
                .await?;
                Ok(SubmissionStage::Failed { error, attempts })
            }
        }
    }

    /// Tracks `confirmation` and finalizes the chain record.
    ///
    /// A pipeline swept mid-flight ends as `Abandoned`.
    pub async fn run_confirmation(
        &self,
        op: &dyn WriteOperation,
        driver: StepDriver,
        tx_hash: &str,
        shutdown: ShutdownSignal,
    ) -> Result<ConfirmationOutcome> {
        let id = driver.id().to_string();
        match self.confirm(op, driver, tx_hash, shutdown).await {
            Err(AppError::NotFound(_)) => {
                tracing::info!("Pipeline {} was swept, confirmation tracking abandoned", id);
                Ok(ConfirmationOutcome::Abandoned)
            }
            other => other,
        }
    }

    async fn confirm(
        &self,
        op: &dyn WriteOperation,
        mut driver: StepDriver,
        tx_hash: &str,
        mut shutdown: ShutdownSignal,
    ) -> Result<ConfirmationOutcome> {
        let id = driver.id().to_string();
        let step = driver.begin().await?;
        let outcome = ConfirmationTracker::new(self.client.as_ref(), &self.settings)
            .track(&step, tx_hash, &mut shutdown)
            .await?;

        match &outcome {
            ConfirmationOutcome::Confirmed(receipt) => {
                step.complete(|u| {
                    u.with("blockNumber", receipt.block_number)
                        .with("gasUsed", receipt.gas_used)
                })
                .await?;
                tracing::info!(
                    "Pipeline {} confirmed tx={} block={:?}",
                    id,
                    tx_hash,
                    receipt.block_number
                );
                self.finalize_record(&id, RECORD_STATUS_CONFIRMED, op.record_fields(receipt))
                    .await;
            }
            ConfirmationOutcome::Reverted(receipt) => {
                step.fail("transaction reverted", |u| {
                    u.with("blockNumber", receipt.block_number)
                        .with("gasUsed", receipt.gas_used)
                })
                .await?;
                self.finalize_record(&id, RECORD_STATUS_REVERTED, op.record_fields(receipt))
                    .await;
            }
            ConfirmationOutcome::Failed(error) => {
                step.fail(&error.to_string(), |u| u.with("errorKind", error.kind()))
                    .await?;
            }
            ConfirmationOutcome::Abandoned => {
                tracing::info!("Pipeline {} confirmation tracking abandoned", id);
            }
        }
        Ok(outcome)
    }

    /// Runs every step in order, confirmation included.
    pub async fn run_to_completion(
        &self,
        op: &dyn WriteOperation,
        id: &str,
        shutdown: ShutdownSignal,
    ) -> Result<()> {
        match self.run_until_submitted(op, id).await? {
            SubmissionStage::Submitted { driver, submitted } => {
                self.run_confirmation(op, driver, &submitted.tx_hash, shutdown)
                    .await?;
            }
            SubmissionStage::Failed { error, attempts } => {
                tracing::error!(
                    "Pipeline {} failed after {} attempt(s): {}",
                    id,
                    attempts,
                    error
                );
            }
        }
        Ok(())
    }

    async fn finalize_record(&self, id: &str, status: &str, fields: serde_json::Value) {
        if let Err(err) = self.records.update(id, Some(status), fields).await {
            tracing::warn!("Failed to update chain record {}: {}", id, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::{ScriptedChainClient, SubmitScript};
    use crate::config::test_config;
    use crate::db::{MemoryRecordStore, RECORD_STATUS_SUBMITTED};
    use crate::models::{OverallStatus, Pipeline, StepName, StepStatus};
    use crate::operations::{CastVote, MintItem};
    use crate::pipeline::store::MemoryPipelineStore;

    struct Fixture {
        runner: PipelineRunner,
        client: Arc<ScriptedChainClient>,
        records: Arc<MemoryRecordStore>,
    }

    fn fixture(client: ScriptedChainClient, settings: PipelineSettings) -> Fixture {
        let client = Arc::new(client);
        let records = Arc::new(MemoryRecordStore::new());
        let registry = Arc::new(PipelineRegistry::new(Arc::new(MemoryPipelineStore::new())));
        Fixture {
            runner: PipelineRunner::new(registry, client.clone(), records.clone(), Arc::new(settings)),
            client,
            records,
        }
    }

    fn mint() -> MintItem {
        MintItem::new("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266", "ipfs://sword").unwrap()
    }

    async fn create(fx: &Fixture, op: &dyn WriteOperation) -> String {
        fx.runner
            .registry()
            .create(op.kind(), op.id_prefix(), op.payload())
            .await
            .unwrap()
            .id
    }

    async fn load(fx: &Fixture, id: &str) -> Pipeline {
        fx.runner.registry().get(id).await.unwrap().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn full_run_confirms_and_records() {
        let fx = fixture(
            ScriptedChainClient::new()
                .with_submits(vec![SubmitScript::Succeed("0xabc".into())])
                .with_heights(vec![Ok(100), Ok(100), Ok(102)]),
            PipelineSettings::from_config(&test_config()),
        );
        let op = mint();
        let id = create(&fx, &op).await;

        fx.runner
            .run_to_completion(&op, &id, ShutdownSignal::never())
            .await
            .unwrap();

        let pipeline = load(&fx, &id).await;
        assert_eq!(pipeline.overall_status, OverallStatus::Confirmed);
        assert!(pipeline
            .steps
            .iter()
            .all(|s| s.status == StepStatus::Completed));
        assert_eq!(pipeline.result.as_ref().unwrap()["txHash"], "0xabc");

        let record = fx.records.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, RECORD_STATUS_CONFIRMED);
        assert_eq!(record.tx_hash, "0xabc");
        assert_eq!(record.data["blockNumber"], 100);
        assert_eq!(record.data["owner"], "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
    }

    #[tokio::test]
    async fn missing_signer_fails_initialization() {
        let fx = fixture(
            ScriptedChainClient::new().without_signer(),
            PipelineSettings::from_config(&test_config()),
        );
        let op = mint();
        let id = create(&fx, &op).await;

        let stage = fx.runner.run_until_submitted(&op, &id).await.unwrap();
        assert!(matches!(
            stage,
            SubmissionStage::Failed { error: PipelineError::Configuration(_), attempts: 0 }
        ));
        let pipeline = load(&fx, &id).await;
        assert_eq!(pipeline.step_status(StepName::Initialization), StepStatus::Error);
        assert_eq!(pipeline.step_status(StepName::ProviderSetup), StepStatus::Pending);
        assert_eq!(pipeline.overall_status, OverallStatus::Error);
        assert!(fx.client.submit_calls().is_empty());
    }

    #[tokio::test]
    async fn missing_contract_fails_contract_setup() {
        let mut config = test_config();
        config.dao_governor_address = None;
        let fx = fixture(ScriptedChainClient::new(), PipelineSettings::from_config(&config));
        let op = CastVote::new(1, true);
        let id = create(&fx, &op).await;

        fx.runner.run_until_submitted(&op, &id).await.unwrap();
        let pipeline = load(&fx, &id).await;
        assert_eq!(pipeline.step_status(StepName::ContractSetup), StepStatus::Error);
        assert_eq!(
            pipeline.error.as_deref(),
            Some("Configuration error: DAO_GOVERNOR_ADDRESS is not configured")
        );
    }

    #[tokio::test]
    async fn degraded_setup_steps_fall_back() {
        let fx = fixture(
            ScriptedChainClient::new()
                .with_heights(vec![Err(PipelineError::Network("timeout".into()))])
                .with_fee(Err(PipelineError::Network("timeout".into())))
                .with_nonce_failures(1),
            PipelineSettings::from_config(&test_config()),
        );
        let op = mint();
        let id = create(&fx, &op).await;

        let stage = fx.runner.run_until_submitted(&op, &id).await.unwrap();
        assert!(matches!(stage, SubmissionStage::Submitted { .. }));

        let pipeline = load(&fx, &id).await;
        let provider = pipeline.step(StepName::ProviderSetup).unwrap();
        assert_eq!(provider.status, StepStatus::Completed);
        assert!(provider.diagnostic_str("warning").is_some());
        let fee = pipeline.step(StepName::FeeEstimation).unwrap();
        assert_eq!(fee.diagnostic_str("source"), Some("default"));
        assert_eq!(fee.diagnostic_str("gasPriceWei"), Some("20000000000"));

        let call = &fx.client.submit_calls()[0];
        assert_eq!(call.params.nonce, None);
        assert_eq!(call.params.gas_price_wei, Some(20_000_000_000));
        assert_eq!(pipeline.overall_status, OverallStatus::Submitted);

        let record = fx.records.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, RECORD_STATUS_SUBMITTED);
    }

    #[tokio::test(start_paused = true)]
    async fn reverted_transaction_errors_pipeline() {
        let fx = fixture(
            ScriptedChainClient::new().with_reverted_receipt(),
            PipelineSettings::from_config(&test_config()),
        );
        let op = CastVote::new(4, true);
        let id = create(&fx, &op).await;

        fx.runner
            .run_to_completion(&op, &id, ShutdownSignal::never())
            .await
            .unwrap();

        let pipeline = load(&fx, &id).await;
        assert_eq!(pipeline.step_status(StepName::Submission), StepStatus::Completed);
        assert_eq!(pipeline.step_status(StepName::Confirmation), StepStatus::Error);
        assert_eq!(pipeline.overall_status, OverallStatus::Error);
        assert_eq!(pipeline.error.as_deref(), Some("transaction reverted"));
        let record = fx.records.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, RECORD_STATUS_REVERTED);
    }

    #[tokio::test(start_paused = true)]
    async fn swept_pipeline_is_abandoned() {
        let fx = fixture(
            ScriptedChainClient::new().with_inclusion_block(None),
            PipelineSettings::from_config(&test_config()),
        );
        let op = mint();
        let id = create(&fx, &op).await;

        let SubmissionStage::Submitted { driver, submitted } =
            fx.runner.run_until_submitted(&op, &id).await.unwrap()
        else {
            panic!("expected submission");
        };
        fx.runner
            .registry()
            .sweep_expired(chrono::Duration::zero())
            .await
            .unwrap();

        let outcome = fx
            .runner
            .run_confirmation(&op, driver, &submitted.tx_hash, ShutdownSignal::never())
            .await
            .unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Abandoned);
        assert_eq!(fx.records.get(&id).await.unwrap().unwrap().status, RECORD_STATUS_SUBMITTED);
    }
}
