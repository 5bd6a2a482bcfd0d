//! Result cache
//!
//! TTL-keyed cache of resolved performance records. Expiry is lazy: an entry
//! whose `expires_at` has been reached reads as absent even while it is still
//! physically stored, until a maintenance call purges it.
//!
//! The cache is an optimisation only. Reads never fail (an unavailable backend
//! is a miss) and writes return a `Result` that the resolution path discards.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use regstat_common::config::DEFAULT_CACHE_TTL_HOURS;
use regstat_common::db::{CacheEntry, CacheStats, PerformanceRecord};
use regstat_common::{Clock, Month, Result};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cache key for a region and month: `<region_key>_<YYYY>-<MM>`
///
/// Built from the normalized month, so any two days of a month collide.
pub fn cache_key(region_key: &str, month: Month) -> String {
    format!("{}_{}", region_key, month.cache_suffix())
}

/// Storage behind [`ResultCache`]
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Raw lookup, expired or not
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Insert or fully replace the entry for `entry.cache_key`
    async fn put(&self, entry: &CacheEntry) -> Result<()>;

    /// Returns true if a row was removed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Remove rows with `expires_at <= now`
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;

    async fn delete_all(&self) -> Result<u64>;

    async fn stats(&self, now: DateTime<Utc>) -> Result<CacheStats>;
}

/// Cache backend on the `result_cache` table
#[derive(Clone)]
pub struct SqliteCacheBackend {
    pool: SqlitePool,
}

impl SqliteCacheBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheBackend for SqliteCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query(
            "SELECT cache_key, payload, expires_at FROM result_cache WHERE cache_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let expires_ms: i64 = row.get("expires_at");
            CacheEntry {
                cache_key: row.get("cache_key"),
                payload: row.get("payload"),
                expires_at: DateTime::from_timestamp_millis(expires_ms)
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            }
        }))
    }

    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO result_cache (cache_key, payload, expires_at, created_at)
            VALUES (?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(cache_key) DO UPDATE SET
                payload = excluded.payload,
                expires_at = excluded.expires_at,
                created_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&entry.cache_key)
        .bind(&entry.payload)
        .bind(entry.expires_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM result_cache WHERE cache_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM result_cache WHERE expires_at <= ?")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM result_cache")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<CacheStats> {
        let (total, expired): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN expires_at <= ? THEN 1 ELSE 0 END), 0)
            FROM result_cache
            "#,
        )
        .bind(now.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        let total = total.max(0) as u64;
        let expired = expired.max(0) as u64;
        Ok(CacheStats {
            total,
            expired,
            active: total.saturating_sub(expired),
        })
    }
}

/// Typed, expiry-aware view over a [`CacheBackend`]
#[derive(Clone)]
pub struct ResultCache {
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
    default_ttl_hours: u32,
}

impl ResultCache {
    pub fn new(backend: Arc<dyn CacheBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            default_ttl_hours: DEFAULT_CACHE_TTL_HOURS,
        }
    }

    /// Override the TTL used by [`ResultCache::set_default`]
    pub fn with_default_ttl(mut self, hours: u32) -> Self {
        self.default_ttl_hours = hours;
        self
    }

    pub fn default_ttl_hours(&self) -> u32 {
        self.default_ttl_hours
    }

    /// Fresh record for `key`, or `None`
    ///
    /// Expired entries, undecodable payloads and backend failures all read as a miss.
    pub async fn get(&self, key: &str) -> Option<PerformanceRecord> {
        let entry = match self.backend.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(cache_key = key, "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(cache_key = key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        if entry.is_expired(self.clock.now()) {
            debug!(cache_key = key, expires_at = %entry.expires_at, "Cache entry expired");
            return None;
        }

        match serde_json::from_str(&entry.payload) {
            Ok(record) => {
                debug!(cache_key = key, "Cache hit");
                Some(record)
            }
            Err(e) => {
                warn!(cache_key = key, error = %e, "Undecodable cache payload, treating as miss");
                None
            }
        }
    }

    /// Store `record` under `key` for `ttl_hours`, replacing any prior entry
    pub async fn set(&self, key: &str, record: &PerformanceRecord, ttl_hours: u32) -> Result<()> {
        let entry = CacheEntry {
            cache_key: key.to_string(),
            payload: serde_json::to_string(record)?,
            expires_at: self.clock.now() + Duration::hours(i64::from(ttl_hours)),
        };
        self.backend.put(&entry).await?;
        debug!(cache_key = key, ttl_hours, "Cache set");
        Ok(())
    }

    /// [`ResultCache::set`] with the default TTL
    pub async fn set_default(&self, key: &str, record: &PerformanceRecord) -> Result<()> {
        self.set(key, record, self.default_ttl_hours).await
    }

    /// Drop one entry; true if it existed
    pub async fn invalidate(&self, key: &str) -> Result<bool> {
        let removed = self.backend.delete(key).await?;
        debug!(cache_key = key, removed, "Cache entry invalidated");
        Ok(removed)
    }

    /// Purge entries that have reached their expiry
    pub async fn clear_expired(&self) -> Result<u64> {
        let deleted = self.backend.delete_expired(self.clock.now()).await?;
        info!("Cleared {} expired cache entries", deleted);
        Ok(deleted)
    }

    pub async fn clear_all(&self) -> Result<u64> {
        let deleted = self.backend.delete_all().await?;
        info!("Cleared all cache ({} entries)", deleted);
        Ok(deleted)
    }

    /// Counts as of now; expired-but-unpurged entries are in `total`
    pub async fn stats(&self) -> Result<CacheStats> {
        self.backend.stats(self.clock.now()).await
    }
}
