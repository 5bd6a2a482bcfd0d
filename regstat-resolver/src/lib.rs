//! regstat-resolver library interface
//!
//! Tiered resolution of regional performance records plus the aggregations and
//! maintenance jobs built on top of it. The `regstat` binary is a thin CLI over
//! [`AppState`].

pub mod aggregator;
pub mod cache;
pub mod jobs;
pub mod regions;
pub mod resolver;
pub mod store;
pub mod synthetic;
pub mod upstream;

use crate::aggregator::Aggregator;
use crate::cache::{ResultCache, SqliteCacheBackend};
use crate::regions::SqliteRegionDirectory;
use crate::resolver::Resolver;
use crate::store::SqliteRecordStore;
use crate::upstream::{NoDataUpstream, UpstreamProvider};
use chrono::{DateTime, Utc};
use regstat_common::config::TomlConfig;
use regstat_common::Clock;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

/// Components shared by every command
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub clock: Arc<dyn Clock>,
    pub resolver: Arc<Resolver>,
    pub aggregator: Arc<Aggregator>,
    pub regions: SqliteRegionDirectory,
    pub store: SqliteRecordStore,
    /// Resolution fan-out applied to jobs as well as aggregations
    pub fan_out: usize,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire the SQLite-backed tiers with no live upstream
    pub fn new(db: SqlitePool, config: &TomlConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_upstream(db, config, clock, Arc::new(NoDataUpstream))
    }

    pub fn with_upstream(
        db: SqlitePool,
        config: &TomlConfig,
        clock: Arc<dyn Clock>,
        upstream: Arc<dyn UpstreamProvider>,
    ) -> Self {
        let regions = SqliteRegionDirectory::new(db.clone());
        let store = SqliteRecordStore::new(db.clone());

        let cache = ResultCache::new(Arc::new(SqliteCacheBackend::new(db.clone())), clock.clone())
            .with_default_ttl(config.cache.ttl_hours);

        let resolver = Arc::new(
            Resolver::new(cache, Arc::new(store.clone()), upstream)
                .with_upstream_timeout(Duration::from_millis(config.resolver.upstream_timeout_ms)),
        );

        let fan_out = config.resolver.fan_out.max(1);
        let aggregator = Arc::new(
            Aggregator::new(resolver.clone(), Arc::new(regions.clone()), clock.clone())
                .with_fan_out(fan_out),
        );

        Self {
            db,
            startup_time: clock.now(),
            clock,
            resolver,
            aggregator,
            regions,
            store,
            fan_out,
        }
    }

    pub fn cache(&self) -> &ResultCache {
        self.resolver.cache()
    }
}
