//! Sequential step driver.
//!
//! A `StepDriver` hands out a handle for the next step in the fixed order
//! only. Completing the handle moves the cursor forward; failing it ends the
//! sequence. There is no way to address any other step.

use std::sync::Arc;

use super::registry::PipelineRegistry;
use super::state_machine::StepUpdate;
use crate::{
    error::{AppError, Result},
    models::{Pipeline, StepName, StepStatus},
};

pub struct StepDriver {
    registry: Arc<PipelineRegistry>,
    id: String,
    next: Option<StepName>,
}

impl StepDriver {
    pub fn new(registry: Arc<PipelineRegistry>, id: impl Into<String>) -> Self {
        Self {
            registry,
            id: id.into(),
            next: StepName::ALL.first().copied(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn next_step(&self) -> Option<StepName> {
        self.next
    }

    /// Moves the next step to `IN_PROGRESS` and returns its handle.
    pub async fn begin(&mut self) -> Result<StepHandle<'_>> {
        let step = self.next.ok_or_else(|| {
            AppError::Internal(format!("Pipeline {} has no remaining steps", self.id))
        })?;
        tracing::debug!("Pipeline {} step {} started", self.id, step);
        let handle = StepHandle { driver: self, step };
        handle.report(StepStatus::InProgress, |update| update).await?;
        Ok(handle)
    }

    async fn send(&self, update: StepUpdate) -> Result<Pipeline> {
        self.registry
            .apply(&self.id, update)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Pipeline {} is no longer tracked", self.id)))
    }
}

pub struct StepHandle<'a> {
    driver: &'a mut StepDriver,
    step: StepName,
}

impl StepHandle<'_> {
    pub fn pipeline_id(&self) -> &str {
        &self.driver.id
    }

    /// Non-terminal update of the current step (`IN_PROGRESS` or `RETRY`).
    pub async fn report<F>(&self, status: StepStatus, build: F) -> Result<Pipeline>
    where
        F: FnOnce(StepUpdate) -> StepUpdate,
    {
        self.driver
            .send(build(StepUpdate::new(self.step, status)))
            .await
    }

    pub async fn complete<F>(self, build: F) -> Result<Pipeline>
    where
        F: FnOnce(StepUpdate) -> StepUpdate,
    {
        let pipeline = self
            .driver
            .send(build(StepUpdate::new(self.step, StepStatus::Completed)))
            .await?;
        self.driver.next = self.step.next();
        tracing::debug!("Pipeline {} step {} completed", self.driver.id, self.step);
        Ok(pipeline)
    }

    pub async fn fail<F>(self, message: &str, build: F) -> Result<Pipeline>
    where
        F: FnOnce(StepUpdate) -> StepUpdate,
    {
        let pipeline = self
            .driver
            .send(build(StepUpdate::new(self.step, StepStatus::Error).error(message)))
            .await?;
        self.driver.next = None;
        tracing::error!(
            "Pipeline {} step {} failed: {}",
            self.driver.id,
            self.step,
            message
        );
        Ok(pipeline)
    }
}
