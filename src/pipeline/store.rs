//! Backing stores for the pipeline registry.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{error::Result, models::Pipeline};

const REDIS_KEY_PREFIX: &str = "pipeline:";
const REDIS_INDEX_KEY: &str = "pipelines:index";

/// Whole-value key/value storage for pipelines.
///
/// `set` replaces the stored pipeline in one write, so readers never see a
/// partially applied update.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Pipeline>>;
    async fn set(&self, pipeline: &Pipeline) -> Result<()>;
    /// Returns whether an entry was removed.
    async fn delete(&self, id: &str) -> Result<bool>;
    async fn list(&self) -> Result<Vec<Pipeline>>;

    fn backend_name(&self) -> &'static str;
}

#[derive(Default)]
pub struct MemoryPipelineStore {
    entries: RwLock<HashMap<String, Pipeline>>,
}

impl MemoryPipelineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineStore for MemoryPipelineStore {
    async fn get(&self, id: &str) -> Result<Option<Pipeline>> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn set(&self, pipeline: &Pipeline) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(pipeline.id.clone(), pipeline.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<Pipeline>> {
        Ok(self.entries.read().await.values().cloned().collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Pipelines as JSON strings under `pipeline:{id}`, with a set of live ids.
#[derive(Clone)]
pub struct RedisPipelineStore {
    redis: ConnectionManager,
}

impl RedisPipelineStore {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;
        Ok(Self { redis })
    }

    fn key(id: &str) -> String {
        format!("{}{}", REDIS_KEY_PREFIX, id)
    }
}

#[async_trait]
impl PipelineStore for RedisPipelineStore {
    async fn get(&self, id: &str) -> Result<Option<Pipeline>> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(Self::key(id)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, pipeline: &Pipeline) -> Result<()> {
        let mut conn = self.redis.clone();
        let raw = serde_json::to_string(pipeline)?;
        let _: () = conn.set(Self::key(&pipeline.id), raw).await?;
        let _: i64 = conn.sadd(REDIS_INDEX_KEY, &pipeline.id).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut conn = self.redis.clone();
        let removed: i64 = conn.del(Self::key(id)).await?;
        let _: i64 = conn.srem(REDIS_INDEX_KEY, id).await?;
        Ok(removed > 0)
    }

    async fn list(&self) -> Result<Vec<Pipeline>> {
        let mut conn = self.redis.clone();
        let ids: Vec<String> = conn.smembers(REDIS_INDEX_KEY).await?;
        let mut pipelines = Vec::with_capacity(ids.len());
        for id in ids {
            let raw: Option<String> = conn.get(Self::key(&id)).await?;
            match decode_entry(&id, raw) {
                Some(pipeline) => pipelines.push(pipeline),
                None => {
                    let _: i64 = conn.del(Self::key(&id)).await?;
                    let _: i64 = conn.srem(REDIS_INDEX_KEY, &id).await?;
                }
            }
        }
        Ok(pipelines)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// Decodes one indexed entry. `None` marks an entry to purge: either the
/// value expired under its index entry or it no longer decodes.
fn decode_entry(id: &str, raw: Option<String>) -> Option<Pipeline> {
    let raw = raw?;
    match serde_json::from_str::<Pipeline>(&raw) {
        Ok(pipeline) => Some(pipeline),
        Err(err) => {
            tracing::warn!("Purging undecodable pipeline id={} err={}", id, err);
            None
        }
    }
}
