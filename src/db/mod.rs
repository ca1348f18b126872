use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{config::Config, error::Result};

pub const RECORD_STATUS_SUBMITTED: &str = "submitted";
pub const RECORD_STATUS_CONFIRMED: &str = "confirmed";
pub const RECORD_STATUS_REVERTED: &str = "reverted";

/// Durable trace of a write operation, keyed by pipeline id.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChainRecord {
    pub id: String,
    pub kind: String,
    pub tx_hash: String,
    pub status: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChainRecord {
    pub fn submitted(id: &str, kind: &str, tx_hash: &str, data: Value) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            kind: kind.to_string(),
            tx_hash: tx_hash.to_string(),
            status: RECORD_STATUS_SUBMITTED.to_string(),
            data,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Persistence for finished write operations.
///
/// Not coupled to pipeline state: callers log failures and move on.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn save(&self, record: &ChainRecord) -> Result<()>;

    /// Sets `status` when given and merges `fields` into `data`.
    async fn update(&self, id: &str, status: Option<&str>, fields: Value) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<ChainRecord>>;

    fn backend_name(&self) -> &'static str;
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let database_url = config
            .database_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is not set"))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        // Migrations live at the crate root: ./migrations
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

// ==================== CHAIN RECORD QUERIES ====================
#[async_trait]
impl RecordStore for Database {
    async fn save(&self, record: &ChainRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chain_records
                (id, kind, tx_hash, status, data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&record.id)
        .bind(&record.kind)
        .bind(&record.tx_hash)
        .bind(&record.status)
        .bind(&record.data)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, id: &str, status: Option<&str>, fields: Value) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE chain_records
            SET status     = COALESCE($2, status),
                data       = data || $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(fields)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ChainRecord>> {
        let record = sqlx::query_as::<_, ChainRecord>("SELECT * FROM chain_records WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

/// Record store used when no database is configured.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<String, ChainRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn save(&self, record: &ChainRecord) -> Result<()> {
        self.records
            .write()
            .await
            .entry(record.id.clone())
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn update(&self, id: &str, status: Option<&str>, fields: Value) -> Result<()> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(id) else {
            return Ok(());
        };
        if let Some(status) = status {
            record.status = status.to_string();
        }
        if let (Value::Object(data), Value::Object(fields)) = (&mut record.data, fields) {
            data.extend(fields);
        }
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<ChainRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    #[tokio::test]
    async fn database_new_returns_error_on_invalid_url() {
        let mut config = test_config();
        config.database_url = Some("not-a-url".to_string());
        assert!(Database::new(&config).await.is_err());
    }

    #[tokio::test]
    async fn database_new_requires_url() {
        assert!(Database::new(&test_config()).await.is_err());
    }

    #[tokio::test]
    async fn memory_store_merges_updates() {
        let store = MemoryRecordStore::new();
        let record = ChainRecord::submitted(
            "mint_1_ab",
            "mint",
            "0xabc",
            serde_json::json!({ "owner": "0x1" }),
        );
        store.save(&record).await.unwrap();
        store
            .update(
                "mint_1_ab",
                Some(RECORD_STATUS_CONFIRMED),
                serde_json::json!({ "blockNumber": 100 }),
            )
            .await
            .unwrap();

        let stored = store.get("mint_1_ab").await.unwrap().unwrap();
        assert_eq!(stored.status, RECORD_STATUS_CONFIRMED);
        assert_eq!(stored.data, serde_json::json!({ "owner": "0x1", "blockNumber": 100 }));
    }

    #[tokio::test]
    async fn memory_store_save_does_not_overwrite() {
        let store = MemoryRecordStore::new();
        let first = ChainRecord::submitted("a", "vote", "0x1", serde_json::json!({}));
        let second = ChainRecord::submitted("a", "vote", "0x2", serde_json::json!({}));
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().unwrap().tx_hash, "0x1");
    }

    #[tokio::test]
    async fn memory_store_update_unknown_is_noop() {
        let store = MemoryRecordStore::new();
        store
            .update("missing", Some(RECORD_STATUS_REVERTED), serde_json::json!({}))
            .await
            .unwrap();
        assert!(store.get("missing").await.unwrap().is_none());
    }
}
