//! Step transitions as data: an update message and a pure reducer.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::progress;
use crate::models::{OverallStatus, Pipeline, StepName, StepState, StepStatus};

/// One transition of a single step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepUpdate {
    pub step: StepName,
    pub status: StepStatus,
    pub diagnostics: Map<String, Value>,
    pub attempts: Option<u32>,
    pub max_attempts: Option<u32>,
    pub error: Option<String>,
}

impl StepUpdate {
    pub fn new(step: StepName, status: StepStatus) -> Self {
        Self {
            step,
            status,
            diagnostics: Map::new(),
            attempts: None,
            max_attempts: None,
            error: None,
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.diagnostics.insert(key.to_string(), value.into());
        self
    }

    pub fn attempts(mut self, attempts: u32, max_attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.diagnostics
            .insert("error".to_string(), Value::String(message.clone()));
        self.error = Some(message);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineUpdate {
    Step(StepUpdate),
    /// Terminal output; only the first one is kept.
    Result(Value),
}

impl From<StepUpdate> for PipelineUpdate {
    fn from(update: StepUpdate) -> Self {
        PipelineUpdate::Step(update)
    }
}

/// `overallStatus` as a function of the step statuses.
pub fn derive_overall_status(steps: &[StepState]) -> OverallStatus {
    let find = |name: StepName| steps.iter().find(|step| step.name == name);

    if steps.iter().any(|step| step.status == StepStatus::Error) {
        return OverallStatus::Error;
    }
    if find(StepName::Confirmation).map(|step| step.status) == Some(StepStatus::Completed) {
        return OverallStatus::Confirmed;
    }
    let submitted = find(StepName::Submission)
        .map(|step| step.status == StepStatus::Completed && step.diagnostic_str("txHash").is_some())
        .unwrap_or(false);
    if submitted {
        return OverallStatus::Submitted;
    }
    OverallStatus::Pending
}

/// Applies one update and returns the next pipeline state.
///
/// Terminal pipelines are returned unchanged.
pub fn reduce(mut pipeline: Pipeline, update: PipelineUpdate, now: DateTime<Utc>) -> Pipeline {
    if pipeline.is_terminal() {
        return pipeline;
    }

    match update {
        PipelineUpdate::Result(value) => {
            if pipeline.result.is_none() {
                pipeline.result = Some(value);
            }
        }
        PipelineUpdate::Step(update) => {
            let step = pipeline.step_mut(update.step);
            step.status = update.status;
            match update.status {
                StepStatus::InProgress if step.started_at.is_none() => {
                    step.started_at = Some(now);
                }
                StepStatus::Completed | StepStatus::Error => {
                    step.ended_at = Some(now);
                }
                _ => {}
            }
            if let Some(attempts) = update.attempts {
                step.attempts = attempts;
            }
            if update.max_attempts.is_some() {
                step.max_attempts = update.max_attempts;
            }
            step.diagnostics.extend(update.diagnostics);

            if update.status == StepStatus::Error && pipeline.error.is_none() {
                pipeline.error = Some(
                    update
                        .error
                        .unwrap_or_else(|| format!("{} failed", update.step)),
                );
            }
        }
    }

    pipeline.overall_status = derive_overall_status(&pipeline.steps);
    if pipeline.overall_status != OverallStatus::Error {
        pipeline.peak_progress = pipeline
            .peak_progress
            .max(progress::weighted_percent(&pipeline.steps));
    }
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OperationKind;

    fn pipeline() -> Pipeline {
        Pipeline::new(
            "mint_1_ab".to_string(),
            OperationKind::Mint,
            serde_json::json!({}),
            Utc::now(),
        )
    }

    fn complete_setup(mut p: Pipeline) -> Pipeline {
        for step in &StepName::ALL[..5] {
            p = reduce(p, StepUpdate::new(*step, StepStatus::InProgress).into(), Utc::now());
            p = reduce(p, StepUpdate::new(*step, StepStatus::Completed).into(), Utc::now());
        }
        p
    }

    #[test]
    fn started_at_is_set_only_on_first_entry() {
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(5);
        let p = reduce(
            pipeline(),
            StepUpdate::new(StepName::Initialization, StepStatus::InProgress).into(),
            t0,
        );
        let p = reduce(
            p,
            StepUpdate::new(StepName::Initialization, StepStatus::InProgress).into(),
            t1,
        );
        let step = p.step(StepName::Initialization).unwrap();
        assert_eq!(step.started_at, Some(t0));
        assert!(step.ended_at.is_none());
    }

    #[test]
    fn ended_at_is_set_on_completion() {
        let now = Utc::now();
        let p = reduce(
            pipeline(),
            StepUpdate::new(StepName::Initialization, StepStatus::Completed).into(),
            now,
        );
        assert_eq!(p.step(StepName::Initialization).unwrap().ended_at, Some(now));
    }

    #[test]
    fn diagnostics_are_merged_not_replaced() {
        let p = reduce(
            pipeline(),
            StepUpdate::new(StepName::FeeEstimation, StepStatus::InProgress)
                .with("source", "node")
                .into(),
            Utc::now(),
        );
        let p = reduce(
            p,
            StepUpdate::new(StepName::FeeEstimation, StepStatus::Completed)
                .with("gasPriceWei", "1000")
                .into(),
            Utc::now(),
        );
        let step = p.step(StepName::FeeEstimation).unwrap();
        assert_eq!(step.diagnostic_str("source"), Some("node"));
        assert_eq!(step.diagnostic_str("gasPriceWei"), Some("1000"));
    }

    #[test]
    fn submission_with_hash_derives_submitted() {
        let p = complete_setup(pipeline());
        let p = reduce(
            p,
            StepUpdate::new(StepName::Submission, StepStatus::Completed)
                .with("txHash", "0xabc")
                .into(),
            Utc::now(),
        );
        assert_eq!(p.overall_status, OverallStatus::Submitted);
        assert_eq!(p.tx_hash(), Some("0xabc"));
    }

    #[test]
    fn submission_without_hash_stays_pending() {
        let p = complete_setup(pipeline());
        let p = reduce(
            p,
            StepUpdate::new(StepName::Submission, StepStatus::Completed).into(),
            Utc::now(),
        );
        assert_eq!(p.overall_status, OverallStatus::Pending);
    }

    #[test]
    fn step_error_marks_pipeline_error_and_records_message() {
        let p = reduce(
            pipeline(),
            StepUpdate::new(StepName::Initialization, StepStatus::Error)
                .error("SIGNER_PRIVATE_KEY is not configured")
                .into(),
            Utc::now(),
        );
        assert_eq!(p.overall_status, OverallStatus::Error);
        assert_eq!(p.error.as_deref(), Some("SIGNER_PRIVATE_KEY is not configured"));
    }

    #[test]
    fn terminal_pipeline_ignores_further_updates() {
        let p = reduce(
            pipeline(),
            StepUpdate::new(StepName::Initialization, StepStatus::Error)
                .error("boom")
                .into(),
            Utc::now(),
        );
        let frozen = p.clone();
        let p = reduce(
            p,
            StepUpdate::new(StepName::ProviderSetup, StepStatus::InProgress).into(),
            Utc::now(),
        );
        let p = reduce(p, PipelineUpdate::Result(serde_json::json!(1)), Utc::now());
        assert_eq!(p, frozen);
    }

    #[test]
    fn result_is_set_once() {
        let p = reduce(pipeline(), PipelineUpdate::Result(serde_json::json!("a")), Utc::now());
        let p = reduce(p, PipelineUpdate::Result(serde_json::json!("b")), Utc::now());
        assert_eq!(p.result, Some(serde_json::json!("a")));
    }

    #[test]
    fn retry_keeps_peak_progress() {
        let p = complete_setup(pipeline());
        let p = reduce(
            p,
            StepUpdate::new(StepName::Submission, StepStatus::InProgress).into(),
            Utc::now(),
        );
        assert_eq!(p.peak_progress, 63);
        let p = reduce(
            p,
            StepUpdate::new(StepName::Submission, StepStatus::Retry).into(),
            Utc::now(),
        );
        assert_eq!(p.peak_progress, 63);
        assert_eq!(progress::percent(&p), 63);
    }
}
