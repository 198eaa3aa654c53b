//! Persistent TTL cache
//!
//! Each authorization runs in a fresh process, so the cache is the only
//! memory shared between invocations. Entries live in a single SQLite table
//! per cache file and carry the epoch-millisecond timestamp of their last
//! refresh. Payloads are stored as JSON text.
//!
//! Lookups classify an entry in a fixed order: absent, partial (a required
//! sub-field was never populated), expired, fresh. A partial entry is
//! reported as such even when it is also stale.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::marker::PhantomData;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Cache keys cannot be empty")]
    EmptyKey,
}

/// Value stored in a [`TtlCache`]
pub trait CachePayload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Whether a required sub-field is still missing
    fn is_partial(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub key: String,
    pub payload: T,
    /// Last refresh, epoch milliseconds
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheStatus<T> {
    Absent,
    Partial(CacheEntry<T>),
    Expired(CacheEntry<T>),
    Fresh(CacheEntry<T>),
}

impl<T> CacheStatus<T> {
    pub fn entry(&self) -> Option<&CacheEntry<T>> {
        match self {
            CacheStatus::Absent => None,
            CacheStatus::Partial(e) | CacheStatus::Expired(e) | CacheStatus::Fresh(e) => Some(e),
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, CacheStatus::Fresh(_))
    }
}

/// Current time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Classify an entry against a TTL at instant `now`
///
/// A TTL of zero makes every entry expired.
pub fn classify<T: CachePayload>(entry: CacheEntry<T>, ttl: Duration, now: i64) -> CacheStatus<T> {
    if entry.payload.is_partial() {
        return CacheStatus::Partial(entry);
    }
    let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    if ttl_millis == 0 || now.saturating_sub(entry.timestamp) > ttl_millis {
        CacheStatus::Expired(entry)
    } else {
        CacheStatus::Fresh(entry)
    }
}

/// Keyed TTL cache backed by a local SQLite file
pub struct TtlCache<T> {
    pool: SqlitePool,
    ttl: Duration,
    _payload: PhantomData<fn() -> T>,
}

impl<T: CachePayload> TtlCache<T> {
    /// Open (or create) the cache file and its table
    pub async fn open(path: impl AsRef<Path>, ttl: Duration) -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        // One connection keeps transactions and plain reads serialized.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY NOT NULL,
                payload TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        debug!(path = %path.as_ref().display(), ttl_secs = ttl.as_secs(), "Opened cache");

        Ok(TtlCache {
            pool,
            ttl,
            _payload: PhantomData,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Status of `key` right now
    pub async fn get(&self, key: &str) -> Result<CacheStatus<T>, CacheError> {
        self.status_at(key, now_millis()).await
    }

    /// Status of `key` at instant `now` (epoch milliseconds)
    pub async fn status_at(&self, key: &str, now: i64) -> Result<CacheStatus<T>, CacheError> {
        Ok(match self.peek(key).await? {
            None => CacheStatus::Absent,
            Some(entry) => classify(entry, self.ttl, now),
        })
    }

    /// Raw entry, without any staleness check
    pub async fn peek(&self, key: &str) -> Result<Option<CacheEntry<T>>, CacheError> {
        let row: Option<(String, String, i64)> =
            sqlx::query_as("SELECT key, payload, timestamp FROM cache_entries WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            None => Ok(None),
            Some((key, payload, timestamp)) => Ok(Some(CacheEntry {
                key,
                payload: serde_json::from_str(&payload)?,
                timestamp,
            })),
        }
    }

    /// Write one entry stamped with the current time
    pub async fn put(&self, key: &str, payload: &T) -> Result<CacheEntry<T>, CacheError> {
        self.put_at(key, payload, now_millis()).await
    }

    /// Write one entry with an explicit timestamp
    pub async fn put_at(
        &self,
        key: &str,
        payload: &T,
        timestamp: i64,
    ) -> Result<CacheEntry<T>, CacheError> {
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }
        let encoded = serde_json::to_string(payload)?;

        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, payload, timestamp) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, timestamp = excluded.timestamp
            "#,
        )
        .bind(key)
        .bind(encoded)
        .bind(timestamp)
        .execute(&self.pool)
        .await?;

        Ok(CacheEntry {
            key: key.to_string(),
            payload: payload.clone(),
            timestamp,
        })
    }

    /// Atomically replace every entry with `entries`, all stamped now
    ///
    /// On error the previous contents are left untouched.
    pub async fn replace_all(&self, entries: &[(String, T)]) -> Result<usize, CacheError> {
        let timestamp = now_millis();

        let mut encoded = Vec::with_capacity(entries.len());
        for (key, payload) in entries {
            if key.is_empty() {
                return Err(CacheError::EmptyKey);
            }
            encoded.push((key.as_str(), serde_json::to_string(payload)?));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cache_entries")
            .execute(&mut *tx)
            .await?;
        for (key, payload) in &encoded {
            sqlx::query(
                r#"
                INSERT INTO cache_entries (key, payload, timestamp) VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, timestamp = excluded.timestamp
                "#,
            )
            .bind(*key)
            .bind(payload.as_str())
            .bind(timestamp)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(count = encoded.len(), "Replaced cache contents");
        Ok(encoded.len())
    }

    pub async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM cache_entries")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn len(&self) -> Result<usize, CacheError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }
}
