use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sqlx::Row;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::DbPool;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The storage contract the session mirror writes through: a flat key→text
/// map with whole-snapshot writes. All callers treat failures as best-effort.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the (key, value) pairs present in storage for the given keys.
    /// Absent keys are simply not in the result.
    async fn read_all(&self, keys: &[&str]) -> Result<Vec<(String, String)>, StorageError>;

    /// Upserts every entry atomically.
    async fn write_all(&self, entries: &[(String, String)]) -> Result<(), StorageError>;

    /// Wipes storage entirely.
    async fn clear(&self) -> Result<(), StorageError>;
}

pub struct SqliteKeyValueStore {
    pool: DbPool,
}

impl SqliteKeyValueStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn read_all(&self, keys: &[&str]) -> Result<Vec<(String, String)>, StorageError> {
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let row = sqlx::query("SELECT value FROM session_kv WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
            if let Some(row) = row {
                entries.push((key.to_string(), row.get::<String, _>("value")));
            }
        }
        Ok(entries)
    }

    async fn write_all(&self, entries: &[(String, String)]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in entries {
            sqlx::query(
                "INSERT INTO session_kv (key, value, updated_at) \
                 VALUES (?1, ?2, datetime('now')) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
                 updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM session_kv").execute(&self.pool).await?;
        Ok(())
    }
}

/// Test double with the same contract, plus a flush counter so debounce
/// behavior is observable.
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
    writes: AtomicUsize,
}

impl InMemoryKeyValueStore {
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn read_all(&self, keys: &[&str]) -> Result<Vec<(String, String)>, StorageError> {
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn write_all(&self, new_entries: &[(String, String)]) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        for (key, value) in new_entries {
            entries.insert(key.clone(), value.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.entries.write().await.clear();
        Ok(())
    }
}
