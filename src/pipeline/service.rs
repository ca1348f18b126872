//! Sync/async entry points over the runner, plus read models for clients.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use super::dispatcher::{Dispatcher, ShutdownSignal};
use super::progress;
use super::retrier::Submitted;
use super::runner::{PipelineRunner, SubmissionStage};
use super::PipelineSettings;
use crate::{
    constants::PIPELINE_STATUS_PATH,
    error::{AppError, PipelineError, Result},
    models::{OperationKind, OverallStatus, Pipeline, StepName, StepStatus},
    operations::WriteOperation,
};

/// Response of a synchronous invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSubmission {
    pub request_id: String,
    pub status: OverallStatus,
    pub tx_hash: String,
    pub reference_link: String,
    pub attempts: u32,
    pub result: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSummary {
    pub name: StepName,
    pub status: StepStatus,
}

/// Response of an asynchronous invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Accepted {
    pub request_id: String,
    pub status_check_endpoint: String,
    pub steps: Vec<StepSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepView {
    pub name: StepName,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatusView {
    pub request_id: String,
    pub kind: OperationKind,
    pub status: OverallStatus,
    pub steps: Vec<StepView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_link: Option<String>,
    pub progress_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_completion_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSummary {
    pub request_id: String,
    pub kind: OperationKind,
    pub status: OverallStatus,
    pub progress_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub fn status_check_endpoint(request_id: &str) -> String {
    format!("{}/{}", PIPELINE_STATUS_PATH, request_id)
}

/// Client-facing view of a pipeline at `now`.
pub fn status_view(pipeline: &Pipeline, settings: &PipelineSettings, now: DateTime<Utc>) -> PipelineStatusView {
    let estimated_completion_time = if pipeline.overall_status == OverallStatus::Submitted {
        let remaining = pipeline
            .step(StepName::Confirmation)
            .and_then(|step| step.diagnostic_u64("remainingBlocks"))
            .unwrap_or(settings.confirmation_threshold);
        let secs = remaining.saturating_mul(settings.block_time_secs);
        i64::try_from(secs)
            .ok()
            .map(|secs| now + chrono::Duration::seconds(secs))
    } else {
        None
    };

    PipelineStatusView {
        request_id: pipeline.id.clone(),
        kind: pipeline.kind,
        status: pipeline.overall_status,
        steps: pipeline
            .steps
            .iter()
            .map(|step| StepView {
                name: step.name,
                status: step.status,
                attempts: (step.attempts > 0).then_some(step.attempts),
                started_at: step.started_at,
                ended_at: step.ended_at,
            })
            .collect(),
        tx_hash: pipeline.tx_hash().map(str::to_string),
        reference_link: pipeline.reference_link().map(str::to_string),
        progress_percent: progress::percent(pipeline),
        error: pipeline.error.clone(),
        estimated_completion_time,
        created_at: pipeline.created_at,
    }
}

/// Submission result handed back to a waiting synchronous caller.
type SyncReply = Result<std::result::Result<Submitted, PipelineError>>;

#[derive(Clone)]
pub struct PipelineService {
    runner: PipelineRunner,
    dispatcher: Arc<Dispatcher>,
}

impl PipelineService {
    pub fn new(runner: PipelineRunner, dispatcher: Arc<Dispatcher>) -> Self {
        Self { runner, dispatcher }
    }

    pub fn backend_name(&self) -> &'static str {
        self.runner.registry().backend_name()
    }

    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.dispatcher.shutdown_signal()
    }

    /// Drives the pipeline through `submission` and returns the outcome.
    ///
    /// The run lives in a dispatcher task, so a dropped caller does not stop
    /// it; confirmation continues in that task after the reply is sent.
    pub async fn submit_sync(&self, op: Arc<dyn WriteOperation>) -> Result<SyncSubmission> {
        let admission = self.dispatcher.admit()?;
        let pipeline = self
            .runner
            .registry()
            .create(op.kind(), op.id_prefix(), op.payload())
            .await?;
        let id = pipeline.id.clone();
        tracing::info!("Pipeline {} started (sync) kind={}", id, op.kind().as_str());

        let (reply_tx, reply_rx) = oneshot::channel::<SyncReply>();
        let runner = self.runner.clone();
        let shutdown = self.dispatcher.shutdown_signal();
        let task_id = id.clone();
        self.dispatcher.spawn(admission, async move {
            match runner.run_until_submitted(op.as_ref(), &task_id).await {
                Ok(SubmissionStage::Submitted { driver, submitted }) => {
                    let tx_hash = submitted.tx_hash.clone();
                    let _ = reply_tx.send(Ok(Ok(submitted)));
                    if let Err(err) = runner
                        .run_confirmation(op.as_ref(), driver, &tx_hash, shutdown)
                        .await
                    {
                        tracing::error!("Pipeline {} confirmation failed: {}", task_id, err);
                    }
                }
                Ok(SubmissionStage::Failed { error, .. }) => {
                    let _ = reply_tx.send(Ok(Err(error)));
                }
                Err(err) => {
                    tracing::error!("Pipeline {} aborted: {}", task_id, err);
                    let _ = reply_tx.send(Err(err));
                }
            }
        });

        let reply = reply_rx
            .await
            .map_err(|_| AppError::Internal(format!("Pipeline {} task ended without a result", id)))??;
        let submitted = match reply {
            Ok(submitted) => submitted,
            Err(source) => {
                return Err(AppError::PipelineFailed {
                    request_id: id,
                    source,
                })
            }
        };

        let snapshot = self.runner.registry().get(&id).await?;
        Ok(SyncSubmission {
            status: snapshot
                .as_ref()
                .map(|p| p.overall_status)
                .unwrap_or(OverallStatus::Submitted),
            result: snapshot.and_then(|p| p.result),
            request_id: id,
            tx_hash: submitted.tx_hash,
            reference_link: submitted.reference_link,
            attempts: submitted.attempts,
        })
    }

    /// Starts the pipeline in the background and returns right away.
    pub async fn submit_async(&self, op: Arc<dyn WriteOperation>) -> Result<Accepted> {
        let admission = self.dispatcher.admit()?;
        let pipeline = self
            .runner
            .registry()
            .create(op.kind(), op.id_prefix(), op.payload())
            .await?;
        tracing::info!(
            "Pipeline {} started (async) kind={}",
            pipeline.id,
            op.kind().as_str()
        );

        let runner = self.runner.clone();
        let shutdown = self.dispatcher.shutdown_signal();
        let id = pipeline.id.clone();
        self.dispatcher.spawn(admission, async move {
            if let Err(err) = runner.run_to_completion(op.as_ref(), &id, shutdown).await {
                tracing::error!("Pipeline {} aborted: {}", id, err);
            }
        });

        Ok(Accepted {
            status_check_endpoint: status_check_endpoint(&pipeline.id),
            steps: pipeline
                .steps
                .iter()
                .map(|step| StepSummary {
                    name: step.name,
                    status: step.status,
                })
                .collect(),
            request_id: pipeline.id,
        })
    }

    pub async fn status(&self, id: &str) -> Result<Option<PipelineStatusView>> {
        let pipeline = self.runner.registry().get(id).await?;
        Ok(pipeline.map(|p| status_view(&p, self.runner.settings(), Utc::now())))
    }

    pub async fn list(&self) -> Result<Vec<PipelineSummary>> {
        let pipelines = self.runner.registry().list_all().await?;
        Ok(pipelines
            .iter()
            .map(|p| PipelineSummary {
                request_id: p.id.clone(),
                kind: p.kind,
                status: p.overall_status,
                progress_percent: progress::percent(p),
                tx_hash: p.tx_hash().map(str::to_string),
                created_at: p.created_at,
            })
            .collect())
    }

    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.dispatcher.shutdown(grace).await
    }
}
