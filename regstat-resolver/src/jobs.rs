//! Maintenance jobs: refresh, backfill and database statistics

use crate::cache::ResultCache;
use crate::regions::{RegionDirectory, SqliteRegionDirectory};
use crate::resolver::{Resolution, Resolver, WriteBack};
use crate::store::{RecordStore, SqliteRecordStore};
use crate::synthetic;
use futures::stream::{self, StreamExt};
use regstat_common::db::CacheStats;
use regstat_common::{Error, Month, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};

/// Largest accepted backfill depth
pub const MAX_BACKFILL_MONTHS: u32 = 24;

/// Outcome of [`refresh_month`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub month: Option<Month>,
    pub total: usize,
    /// Resolved and persisted (or already stored)
    pub succeeded: usize,
    /// Resolved but the store write-back failed
    pub failed: usize,
    pub expired_cleared: u64,
    /// Resolutions per serving tier
    pub by_tier: BTreeMap<String, usize>,
    pub duration_ms: u64,
}

/// Clear expired cache entries, then resolve every leaf region for `month`
pub async fn refresh_month(
    resolver: &Resolver,
    regions: &dyn RegionDirectory,
    month: Month,
    fan_out: usize,
) -> Result<RefreshSummary> {
    let started = Instant::now();

    let expired_cleared = match resolver.cache().clear_expired().await {
        Ok(count) => count,
        Err(e) => {
            warn!(error = %e, "Could not clear expired cache entries");
            0
        }
    };

    let all = regions.list_leaves().await?;
    info!("Refreshing {} regions for {}", all.len(), month);

    let resolutions: Vec<Resolution> = stream::iter(&all)
        .map(|region| async move { resolver.resolve_traced(&region.region_key, month).await })
        .buffered(fan_out.max(1))
        .collect()
        .await;

    let mut summary = RefreshSummary {
        month: Some(month),
        total: resolutions.len(),
        expired_cleared,
        ..Default::default()
    };
    for resolution in &resolutions {
        if resolution.write_back == WriteBack::Failed {
            summary.failed += 1;
        } else {
            summary.succeeded += 1;
        }
        *summary.by_tier.entry(resolution.tier.to_string()).or_insert(0) += 1;
    }
    summary.duration_ms = started.elapsed().as_millis() as u64;

    info!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        duration_ms = summary.duration_ms,
        "Refresh complete"
    );
    Ok(summary)
}

/// Outcome of [`backfill_history`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillSummary {
    pub regions: usize,
    pub months: u32,
    pub inserted: u64,
    /// Rows that already existed and were left alone
    pub skipped: u64,
    pub failed: u64,
}

/// Seed the store with synthetic leaf-region records for the last `months` months
///
/// Existing rows are never overwritten, so real data always wins.
pub async fn backfill_history(
    store: &dyn RecordStore,
    regions: &dyn RegionDirectory,
    end: Month,
    months: u32,
) -> Result<BackfillSummary> {
    if !(1..=MAX_BACKFILL_MONTHS).contains(&months) {
        return Err(Error::InvalidInput(format!(
            "Months must be between 1 and {}",
            MAX_BACKFILL_MONTHS
        )));
    }

    let all = regions.list_leaves().await?;
    info!("Backfilling {} months for {} regions", months, all.len());

    let mut summary = BackfillSummary {
        regions: all.len(),
        months,
        ..Default::default()
    };

    for (index, region) in all.iter().enumerate() {
        for back in (0..months).rev() {
            let month = end.minus_months(back);
            let record = synthetic::generate(&region.region_key, month);
            match store.insert_if_absent(&record).await {
                Ok(true) => summary.inserted += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    warn!(region = %region.region_key, month = %month, error = %e, "Backfill insert failed");
                    summary.failed += 1;
                }
            }
        }
        info!("[{}/{}] {} backfilled", index + 1, all.len(), region.display_name);
    }

    Ok(summary)
}

/// Database and cache health snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStats {
    pub regions: u64,
    pub performance_records: u64,
    pub earliest_month: Option<Month>,
    pub latest_month: Option<Month>,
    pub cache: CacheStats,
}

pub async fn database_stats(
    regions: &SqliteRegionDirectory,
    store: &SqliteRecordStore,
    cache: &ResultCache,
) -> Result<DatabaseStats> {
    let range = store.month_range().await?;

    Ok(DatabaseStats {
        regions: regions.count().await?,
        performance_records: store.count().await?,
        earliest_month: range.map(|(earliest, _)| earliest),
        latest_month: range.map(|(_, latest)| latest),
        cache: cache.stats().await?,
    })
}
