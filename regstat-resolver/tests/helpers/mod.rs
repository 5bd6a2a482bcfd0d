//! Test Helper Utilities
//!
//! Counting and failing doubles for the resolver's collaborators, plus a
//! seeded in-memory database.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use regstat_common::db::{init_memory_database, CacheEntry, CacheStats, PerformanceRecord, Region};
use regstat_common::time::ManualClock;
use regstat_common::{Error, Month, Result};
use regstat_resolver::cache::{CacheBackend, ResultCache, SqliteCacheBackend};
use regstat_resolver::regions::{RegionDirectory, SqliteRegionDirectory};
use regstat_resolver::resolver::Resolver;
use regstat_resolver::store::{RecordStore, SqliteRecordStore};
use regstat_resolver::upstream::{NoDataUpstream, UpstreamProvider};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap()
}

pub fn month(year: i32, month: u32) -> Month {
    Month::from_ym(year, month).unwrap()
}

pub fn region(key: &str, name: &str, parent: Option<&str>) -> Region {
    Region {
        region_key: key.to_string(),
        display_name: name.to_string(),
        parent_region_key: parent.map(str::to_string),
    }
}

/// Five Uttar Pradesh districts plus one Maharashtra district
pub fn sample_regions() -> Vec<Region> {
    vec![
        region("UP_AGRA", "Agra", Some("UP")),
        region("UP_BAREILLY", "Bareilly", Some("UP")),
        region("UP_GORAKHPUR", "Gorakhpur", Some("UP")),
        region("UP_LUCKNOW", "Lucknow", Some("UP")),
        region("UP_MEERUT", "Meerut", Some("UP")),
        region("MH_PUNE", "Pune", Some("MH")),
    ]
}

pub async fn seeded_pool(regions: &[Region]) -> SqlitePool {
    let pool = init_memory_database().await.unwrap();
    SqliteRegionDirectory::new(pool.clone())
        .upsert_regions(regions)
        .await
        .unwrap();
    pool
}

/// Store wrapper counting calls per operation
pub struct CountingStore {
    inner: Arc<dyn RecordStore>,
    pub finds: AtomicUsize,
    pub upserts: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self {
            inner,
            finds: AtomicUsize::new(0),
            upserts: AtomicUsize::new(0),
        }
    }

    pub fn finds(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for CountingStore {
    async fn find(&self, region_key: &str, month: Month) -> Result<Option<PerformanceRecord>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find(region_key, month).await
    }

    async fn upsert(&self, record: &PerformanceRecord) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(record).await
    }

    async fn insert_if_absent(&self, record: &PerformanceRecord) -> Result<bool> {
        self.inner.insert_if_absent(record).await
    }
}

/// Store whose reads and writes can be made to fail independently
#[derive(Default)]
pub struct FailingStore {
    pub fail_reads: bool,
    pub fail_writes: bool,
    pub upserts: AtomicUsize,
}

#[async_trait]
impl RecordStore for FailingStore {
    async fn find(&self, _region_key: &str, _month: Month) -> Result<Option<PerformanceRecord>> {
        if self.fail_reads {
            return Err(Error::Internal("store offline".to_string()));
        }
        Ok(None)
    }

    async fn upsert(&self, _record: &PerformanceRecord) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(Error::Internal("disk full".to_string()));
        }
        Ok(())
    }

    async fn insert_if_absent(&self, _record: &PerformanceRecord) -> Result<bool> {
        Err(Error::Internal("store offline".to_string()))
    }
}

/// Cache backend that fails every operation
pub struct FailingCacheBackend;

#[async_trait]
impl CacheBackend for FailingCacheBackend {
    async fn get(&self, _key: &str) -> Result<Option<CacheEntry>> {
        Err(Error::Internal("cache offline".to_string()))
    }

    async fn put(&self, _entry: &CacheEntry) -> Result<()> {
        Err(Error::Internal("cache offline".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        Err(Error::Internal("cache offline".to_string()))
    }

    async fn delete_expired(&self, _now: DateTime<Utc>) -> Result<u64> {
        Err(Error::Internal("cache offline".to_string()))
    }

    async fn delete_all(&self) -> Result<u64> {
        Err(Error::Internal("cache offline".to_string()))
    }

    async fn stats(&self, _now: DateTime<Utc>) -> Result<CacheStats> {
        Err(Error::Internal("cache offline".to_string()))
    }
}

/// What a [`ScriptedUpstream`] does on every fetch
#[derive(Clone)]
pub enum UpstreamBehavior {
    NoData,
    Fail,
    /// Return this record as-is
    Record(PerformanceRecord),
    /// Sleep before answering with no data
    Slow(Duration),
}

/// Upstream with a fixed behaviour and a call counter
pub struct ScriptedUpstream {
    behavior: UpstreamBehavior,
    calls: AtomicUsize,
}

impl ScriptedUpstream {
    pub fn new(behavior: UpstreamBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamProvider for ScriptedUpstream {
    fn source_id(&self) -> &'static str {
        "scripted"
    }

    async fn fetch(&self, _region_key: &str, _month: Month) -> Result<Option<PerformanceRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            UpstreamBehavior::NoData => Ok(None),
            UpstreamBehavior::Fail => Err(Error::Internal("upstream 503".to_string())),
            UpstreamBehavior::Record(record) => Ok(Some(record.clone())),
            UpstreamBehavior::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(None)
            }
        }
    }
}

/// Region directory that is always unavailable
pub struct FailingRegionDirectory;

#[async_trait]
impl RegionDirectory for FailingRegionDirectory {
    async fn list_all(&self) -> Result<Vec<Region>> {
        Err(Error::Internal("regions offline".to_string()))
    }

    async fn find_by_key(&self, _region_key: &str) -> Result<Option<Region>> {
        Err(Error::Internal("regions offline".to_string()))
    }
}

/// A resolver over an in-memory database with observable collaborators
pub struct Harness {
    pub pool: SqlitePool,
    pub clock: Arc<ManualClock>,
    pub store: Arc<CountingStore>,
    pub upstream: Arc<ScriptedUpstream>,
    pub resolver: Arc<Resolver>,
}

impl Harness {
    pub async fn new(regions: &[Region], behavior: UpstreamBehavior) -> Self {
        let pool = seeded_pool(regions).await;
        let clock = Arc::new(ManualClock::new(start_time()));
        let store = Arc::new(CountingStore::new(Arc::new(SqliteRecordStore::new(pool.clone()))));
        let upstream = Arc::new(ScriptedUpstream::new(behavior));

        let cache = ResultCache::new(Arc::new(SqliteCacheBackend::new(pool.clone())), clock.clone());
        let resolver = Arc::new(Resolver::new(cache, store.clone(), upstream.clone()));

        Self {
            pool,
            clock,
            store,
            upstream,
            resolver,
        }
    }

    pub async fn no_upstream(regions: &[Region]) -> Self {
        Self::new(regions, UpstreamBehavior::NoData).await
    }

    pub fn directory(&self) -> Arc<SqliteRegionDirectory> {
        Arc::new(SqliteRegionDirectory::new(self.pool.clone()))
    }
}

/// Resolver over the given store and cache backend, with no upstream data
pub fn resolver_with(store: Arc<dyn RecordStore>, backend: Arc<dyn CacheBackend>) -> Resolver {
    let clock = Arc::new(ManualClock::new(start_time()));
    Resolver::new(ResultCache::new(backend, clock), store, Arc::new(NoDataUpstream))
}
