//! Tiered record resolution
//!
//! Priority: Cache → Store → Upstream → Synthetic. Each tier runs only when the
//! one before it produced nothing, and a hit on a lower tier is written back
//! into every tier above it so repeated calls converge on cache hits.
//!
//! Resolution is total. Source failures are misses, write-back failures are
//! logged and dropped, and the synthetic tier always produces a record.
//!
//! No lock is held across tiers. Two callers resolving the same key at once may
//! both miss and both write back; writes are idempotent upserts, so this only
//! costs redundant work.

use crate::cache::{cache_key, ResultCache};
use crate::store::RecordStore;
use crate::synthetic;
use crate::upstream::UpstreamProvider;
use regstat_common::config::DEFAULT_UPSTREAM_TIMEOUT_MS;
use regstat_common::db::PerformanceRecord;
use regstat_common::Month;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source that produced a resolved record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Cache,
    Store,
    Upstream,
    Synthetic,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Cache => "cache",
            Tier::Store => "store",
            Tier::Upstream => "upstream",
            Tier::Synthetic => "synthetic",
        };
        f.write_str(name)
    }
}

/// Outcome of writing a resolved record back into the record store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteBack {
    /// Served from the store or cache, nothing to persist
    NotNeeded,
    Saved,
    /// The record was returned unsaved
    Failed,
}

/// A resolved record and the tier that served it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub record: PerformanceRecord,
    pub tier: Tier,
    pub write_back: WriteBack,
}

/// Resolves `(region, month)` to a performance record
pub struct Resolver {
    cache: ResultCache,
    store: Arc<dyn RecordStore>,
    upstream: Arc<dyn UpstreamProvider>,
    upstream_timeout: Duration,
}

impl Resolver {
    pub fn new(
        cache: ResultCache,
        store: Arc<dyn RecordStore>,
        upstream: Arc<dyn UpstreamProvider>,
    ) -> Self {
        Self {
            cache,
            store,
            upstream,
            upstream_timeout: Duration::from_millis(DEFAULT_UPSTREAM_TIMEOUT_MS),
        }
    }

    /// Bound on a single upstream fetch; exceeding it counts as no data
    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Resolve a record; never fails
    pub async fn resolve(&self, region_key: &str, month: Month) -> PerformanceRecord {
        self.resolve_traced(region_key, month).await.record
    }

    /// Resolve a record and report which tier served it
    pub async fn resolve_traced(&self, region_key: &str, month: Month) -> Resolution {
        let cache_key = cache_key(region_key, month);

        // Tier 1: cache. Already fresh, nothing to write back
        if let Some(record) = self.cache.get(&cache_key).await {
            return self.served(record, Tier::Cache, WriteBack::NotNeeded);
        }

        // Tier 2: store
        match self.store.find(region_key, month).await {
            Ok(Some(record)) => {
                self.write_to_cache(&cache_key, &record).await;
                return self.served(record, Tier::Store, WriteBack::NotNeeded);
            }
            Ok(None) => {
                debug!(region = region_key, month = %month, "Store miss");
            }
            Err(e) => {
                warn!(region = region_key, month = %month, error = %e, "Record store unavailable, treating as miss");
            }
        }

        // Tier 3: upstream
        if let Some(record) = self.fetch_upstream(region_key, month).await {
            let write_back = self.persist(&record).await;
            self.write_to_cache(&cache_key, &record).await;
            return self.served(record, Tier::Upstream, write_back);
        }

        // Tier 4: synthetic, always succeeds
        let record = synthetic::generate(region_key, month);
        let write_back = self.persist(&record).await;
        self.write_to_cache(&cache_key, &record).await;
        self.served(record, Tier::Synthetic, write_back)
    }

    fn served(&self, record: PerformanceRecord, tier: Tier, write_back: WriteBack) -> Resolution {
        if tier == Tier::Synthetic {
            info!(region = %record.region_key, month = %record.month, %tier, "Using synthetic data");
        } else {
            info!(region = %record.region_key, month = %record.month, %tier, "Resolved");
        }
        Resolution {
            record,
            tier,
            write_back,
        }
    }

    async fn fetch_upstream(&self, region_key: &str, month: Month) -> Option<PerformanceRecord> {
        let source = self.upstream.source_id();
        let fetch = self.upstream.fetch(region_key, month);

        match tokio::time::timeout(self.upstream_timeout, fetch).await {
            Ok(Ok(Some(mut record))) => {
                if record.region_key != region_key || record.month != month {
                    debug!(
                        source,
                        returned_region = %record.region_key,
                        returned_month = %record.month,
                        "Upstream record re-keyed to the requested region and month"
                    );
                    record.region_key = region_key.to_string();
                    record.month = month;
                }
                Some(record)
            }
            Ok(Ok(None)) => {
                debug!(source, region = region_key, month = %month, "Upstream has no data");
                None
            }
            Ok(Err(e)) => {
                warn!(source, region = region_key, month = %month, error = %e, "Upstream fetch failed");
                None
            }
            Err(_) => {
                warn!(
                    source,
                    region = region_key,
                    month = %month,
                    timeout_ms = self.upstream_timeout.as_millis() as u64,
                    "Upstream fetch timed out"
                );
                None
            }
        }
    }

    /// Store write-back. The freshly resolved record is returned either way
    async fn persist(&self, record: &PerformanceRecord) -> WriteBack {
        match self.store.upsert(record).await {
            Ok(()) => WriteBack::Saved,
            Err(e) => {
                warn!(
                    region = %record.region_key,
                    month = %record.month,
                    error = %e,
                    "Store write-back failed, returning unsaved record"
                );
                WriteBack::Failed
            }
        }
    }

    /// Cache write-back with the default TTL
    async fn write_to_cache(&self, cache_key: &str, record: &PerformanceRecord) {
        if let Err(e) = self.cache.set_default(cache_key, record).await {
            warn!(cache_key, error = %e, "Cache write-back failed");
        }
    }
}
