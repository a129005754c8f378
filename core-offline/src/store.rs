//! # Operation Store
//!
//! Durable backing for required operations so queued work survives a
//! restart. Only operations that expose an
//! [`OperationDescriptor`](crate::OperationDescriptor) can be stored; the
//! closure itself is rebuilt through an
//! [`OperationRegistry`](crate::OperationRegistry).

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::{OfflineError, Result};
use crate::operation::OperationDescriptor;
use crate::queue::OperationId;

/// Persisted form of a queued operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: OperationId,
    pub key: String,
    pub descriptor: OperationDescriptor,
    pub is_required: bool,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

/// Storage for queued operations.
///
/// Like the in-memory queue, a store holds at most one record per key and
/// returns records in insertion order.
#[async_trait]
pub trait OperationStore: Send + Sync {
    /// Insert `record`, replacing any record with the same key.
    async fn save(&self, record: &OperationRecord) -> Result<()>;

    async fn remove(&self, id: OperationId) -> Result<()>;

    async fn remove_key(&self, key: &str) -> Result<()>;

    async fn record_attempt(&self, id: OperationId, attempts: u32) -> Result<()>;

    /// Delete everything, returning how many records were removed.
    async fn clear(&self) -> Result<u64>;

    async fn load_all(&self) -> Result<Vec<OperationRecord>>;
}

/// SQLite-backed store
pub struct SqliteOperationStore {
    pool: SqlitePool,
}

impl SqliteOperationStore {
    /// Wrap an existing pool. Call [`initialize`](Self::initialize) before use.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `path` and prepare the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.initialize().await?;
        Ok(store)
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_operations (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                op_key TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                is_required INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<OperationRecord> {
        let id: String = row.try_get("id")?;
        let payload: String = row.try_get("payload")?;
        let attempts: i64 = row.try_get("attempts")?;
        let created_at: i64 = row.try_get("created_at")?;

        Ok(OperationRecord {
            id: OperationId::from_string(&id)?,
            key: row.try_get("op_key")?,
            descriptor: OperationDescriptor {
                kind: row.try_get("kind")?,
                payload: serde_json::from_str(&payload)?,
            },
            is_required: row.try_get::<i64, _>("is_required")? != 0,
            attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
            created_at: Utc
                .timestamp_millis_opt(created_at)
                .single()
                .ok_or_else(|| OfflineError::Store(format!("invalid timestamp {created_at}")))?,
        })
    }
}

#[async_trait]
impl OperationStore for SqliteOperationStore {
    async fn save(&self, record: &OperationRecord) -> Result<()> {
        let payload = serde_json::to_string(&record.descriptor.payload)?;
        let mut tx = self.pool.begin().await?;

        // Delete first so the replacement gets a fresh sequence number.
        sqlx::query("DELETE FROM pending_operations WHERE op_key = ? OR id = ?")
            .bind(&record.key)
            .bind(record.id.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO pending_operations (
                id, op_key, kind, payload, is_required, attempts, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.as_str())
        .bind(&record.key)
        .bind(&record.descriptor.kind)
        .bind(payload)
        .bind(record.is_required as i64)
        .bind(record.attempts as i64)
        .bind(record.created_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(id = %record.id, kind = %record.descriptor.kind, "Persisted pending operation");
        Ok(())
    }

    async fn remove(&self, id: OperationId) -> Result<()> {
        sqlx::query("DELETE FROM pending_operations WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_key(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM pending_operations WHERE op_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_attempt(&self, id: OperationId, attempts: u32) -> Result<()> {
        sqlx::query("UPDATE pending_operations SET attempts = ? WHERE id = ?")
            .bind(attempts as i64)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM pending_operations")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn load_all(&self) -> Result<Vec<OperationRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, op_key, kind, payload, is_required, attempts, created_at
            FROM pending_operations
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }
}

/// Non-durable store, for tests and hosts without a database.
#[derive(Debug, Default)]
pub struct InMemoryOperationStore {
    records: Mutex<Vec<OperationRecord>>,
}

impl InMemoryOperationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_records<T>(&self, f: impl FnOnce(&mut Vec<OperationRecord>) -> T) -> Result<T> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| OfflineError::Store("in-memory store lock poisoned".to_string()))?;
        Ok(f(&mut records))
    }
}

#[async_trait]
impl OperationStore for InMemoryOperationStore {
    async fn save(&self, record: &OperationRecord) -> Result<()> {
        self.with_records(|records| {
            records.retain(|r| r.key != record.key && r.id != record.id);
            records.push(record.clone());
        })
    }

    async fn remove(&self, id: OperationId) -> Result<()> {
        self.with_records(|records| records.retain(|r| r.id != id))
    }

    async fn remove_key(&self, key: &str) -> Result<()> {
        self.with_records(|records| records.retain(|r| r.key != key))
    }

    async fn record_attempt(&self, id: OperationId, attempts: u32) -> Result<()> {
        self.with_records(|records| {
            if let Some(record) = records.iter_mut().find(|r| r.id == id) {
                record.attempts = attempts;
            }
        })
    }

    async fn clear(&self) -> Result<u64> {
        self.with_records(|records| {
            let removed = records.len() as u64;
            records.clear();
            removed
        })
    }

    async fn load_all(&self) -> Result<Vec<OperationRecord>> {
        self.with_records(|records| records.clone())
    }
}
