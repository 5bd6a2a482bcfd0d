//! Upstream data provider
//!
//! Extension point for a live data source. `Ok(None)` means the provider had no
//! data for the key, which is an ordinary outcome and sends the resolver on to
//! the synthetic tier.

use async_trait::async_trait;
use regstat_common::db::PerformanceRecord;
use regstat_common::{Month, Result};

#[async_trait]
pub trait UpstreamProvider: Send + Sync {
    /// Provider identifier for logs
    fn source_id(&self) -> &'static str;

    async fn fetch(&self, region_key: &str, month: Month) -> Result<Option<PerformanceRecord>>;
}

/// Provider used until a live integration exists: never has data
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDataUpstream;

#[async_trait]
impl UpstreamProvider for NoDataUpstream {
    fn source_id(&self) -> &'static str {
        "none"
    }

    async fn fetch(&self, _region_key: &str, _month: Month) -> Result<Option<PerformanceRecord>> {
        Ok(None)
    }
}
