use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::state_machine::{reduce, PipelineUpdate};
use super::store::PipelineStore;
use crate::{
    error::Result,
    models::{OperationKind, Pipeline},
    utils::generate_request_id,
};

/// Keyed pipeline state on top of an injected store.
///
/// Every write goes through `write_lock`, which makes `update` an atomic
/// read-modify-write and keeps the sweep from racing a live update.
pub struct PipelineRegistry {
    store: Arc<dyn PipelineStore>,
    write_lock: Mutex<()>,
}

impl PipelineRegistry {
    pub fn new(store: Arc<dyn PipelineStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub async fn create(&self, kind: OperationKind, prefix: &str, payload: Value) -> Result<Pipeline> {
        let pipeline = Pipeline::new(generate_request_id(prefix), kind, payload, Utc::now());
        let _guard = self.write_lock.lock().await;
        self.store.set(&pipeline).await?;
        tracing::debug!("Pipeline created id={} kind={}", pipeline.id, kind.as_str());
        Ok(pipeline)
    }

    /// `None` for unknown or already swept ids.
    pub async fn get(&self, id: &str) -> Result<Option<Pipeline>> {
        self.store.get(id).await
    }

    /// Applies `f` to the stored pipeline and writes the result back.
    ///
    /// Returns `None` without writing when the id is gone.
    pub async fn update<F>(&self, id: &str, f: F) -> Result<Option<Pipeline>>
    where
        F: FnOnce(Pipeline) -> Pipeline + Send,
    {
        let _guard = self.write_lock.lock().await;
        let Some(current) = self.store.get(id).await? else {
            return Ok(None);
        };
        let next = f(current);
        self.store.set(&next).await?;
        Ok(Some(next))
    }

    pub async fn apply(&self, id: &str, update: impl Into<PipelineUpdate>) -> Result<Option<Pipeline>> {
        let update = update.into();
        self.update(id, move |pipeline| reduce(pipeline, update, Utc::now()))
            .await
    }

    /// All live pipelines, newest first.
    pub async fn list_all(&self) -> Result<Vec<Pipeline>> {
        let mut pipelines = self.store.list().await?;
        pipelines.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(pipelines)
    }

    /// Deletes every pipeline whose age reached `retention`, whatever its status.
    pub async fn sweep_expired(&self, retention: chrono::Duration) -> Result<usize> {
        self.sweep_expired_at(retention, Utc::now()).await
    }

    pub async fn sweep_expired_at(
        &self,
        retention: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut removed = 0;
        for pipeline in self.store.list().await? {
            if now - pipeline.created_at >= retention && self.store.delete(&pipeline.id).await? {
                tracing::debug!(
                    "Pipeline expired id={} status={:?}",
                    pipeline.id,
                    pipeline.overall_status
                );
                removed += 1;
            }
        }
        Ok(removed)
    }
}
