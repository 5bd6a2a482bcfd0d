//! Aggregations over resolved records
//!
//! Every operation validates its input before resolving anything, then fans
//! the independent per-region (or per-month) resolutions out with a bounded,
//! order-preserving stream so results come back in caller-visible order.

use crate::regions::RegionDirectory;
use crate::resolver::Resolver;
use crate::synthetic::CRORE;
use futures::stream::{self, StreamExt};
use regstat_common::config::DEFAULT_FAN_OUT;
use regstat_common::db::{PerformanceRecord, Region};
use regstat_common::{Clock, Error, Month, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Largest accepted `limit` for [`Aggregator::rank_top`]
pub const MAX_RANK_LIMIT: usize = 50;

/// Largest accepted `months_back` for [`Aggregator::historical_series`]
pub const MAX_HISTORY_MONTHS: u32 = 24;

/// Record field a ranking can sort by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    TotalWorkers,
    ActiveWorkers,
    JobCardsIssued,
    WorkCompleted,
    AverageWage,
    TotalExpenditure,
    PersonDaysGenerated,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::TotalWorkers,
        Metric::ActiveWorkers,
        Metric::JobCardsIssued,
        Metric::WorkCompleted,
        Metric::AverageWage,
        Metric::TotalExpenditure,
        Metric::PersonDaysGenerated,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::TotalWorkers => "totalWorkers",
            Metric::ActiveWorkers => "activeWorkers",
            Metric::JobCardsIssued => "jobCardsIssued",
            Metric::WorkCompleted => "workCompleted",
            Metric::AverageWage => "averageWage",
            Metric::TotalExpenditure => "totalExpenditure",
            Metric::PersonDaysGenerated => "personDaysGenerated",
        }
    }

    /// Value of this metric on a record
    pub fn value(&self, record: &PerformanceRecord) -> f64 {
        match self {
            Metric::TotalWorkers => record.total_workers as f64,
            Metric::ActiveWorkers => record.active_workers as f64,
            Metric::JobCardsIssued => record.job_cards_issued as f64,
            Metric::WorkCompleted => record.work_completed_pct,
            Metric::AverageWage => record.average_wage,
            Metric::TotalExpenditure => record.total_expenditure,
            Metric::PersonDaysGenerated => record.person_days_generated as f64,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let metric = match s.trim() {
            "totalWorkers" | "total_workers" => Metric::TotalWorkers,
            "activeWorkers" | "active_workers" => Metric::ActiveWorkers,
            "jobCardsIssued" | "job_cards_issued" => Metric::JobCardsIssued,
            "workCompleted" | "workCompletedPct" | "work_completed" | "work_completed_pct" => {
                Metric::WorkCompleted
            }
            "averageWage" | "average_wage" => Metric::AverageWage,
            "totalExpenditure" | "total_expenditure" => Metric::TotalExpenditure,
            "personDaysGenerated" | "person_days_generated" => Metric::PersonDaysGenerated,
            other => {
                let valid: Vec<&str> = Metric::ALL.iter().map(Metric::name).collect();
                return Err(Error::InvalidInput(format!(
                    "Invalid metric '{}'. Valid metrics are: {}",
                    other,
                    valid.join(", ")
                )));
            }
        };
        Ok(metric)
    }
}

/// One side of a comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionPerformance {
    pub region_key: String,
    pub data: PerformanceRecord,
}

/// Two regions side by side; every difference is `a - b`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub month: Month,
    pub region_a: RegionPerformance,
    pub region_b: RegionPerformance,
    pub workers_diff: i64,
    pub expenditure_diff: f64,
    pub wage_diff: f64,
}

/// Entry in a ranking
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedRegion {
    #[serde(flatten)]
    pub region: Region,
    pub performance: PerformanceRecord,
}

/// Totals over the children of a parent region
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionalSummary {
    pub parent_region_key: String,
    pub month: Month,
    pub child_count: usize,
    pub total_workers: i64,
    pub total_active_workers: i64,
    pub total_expenditure: f64,
    pub total_person_days: i64,
    /// Currency units per person-day, 0 when no person-days were generated
    pub average_wage: f64,
}

/// Comparison, ranking and roll-up built on a [`Resolver`]
pub struct Aggregator {
    resolver: Arc<Resolver>,
    regions: Arc<dyn RegionDirectory>,
    clock: Arc<dyn Clock>,
    fan_out: usize,
}

impl Aggregator {
    pub fn new(
        resolver: Arc<Resolver>,
        regions: Arc<dyn RegionDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            resolver,
            regions,
            clock,
            fan_out: DEFAULT_FAN_OUT,
        }
    }

    /// Maximum concurrent resolutions per call (at least 1)
    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out.max(1);
        self
    }

    /// Compare two regions for one month
    pub async fn compare(&self, region_a: &str, region_b: &str, month: Month) -> Result<Comparison> {
        let region_a = validate_region_key(region_a)?;
        let region_b = validate_region_key(region_b)?;

        info!(region_a, region_b, month = %month, "Comparing regions");

        let (a, b) = tokio::join!(
            self.resolver.resolve(region_a, month),
            self.resolver.resolve(region_b, month),
        );

        Ok(Comparison {
            month,
            workers_diff: a.total_workers - b.total_workers,
            expenditure_diff: a.total_expenditure - b.total_expenditure,
            wage_diff: a.average_wage - b.average_wage,
            region_a: RegionPerformance {
                region_key: region_a.to_string(),
                data: a,
            },
            region_b: RegionPerformance {
                region_key: region_b.to_string(),
                data: b,
            },
        })
    }

    /// The `limit` best regions by `metric`, highest first
    ///
    /// Only leaf regions are ranked; parents are roll-ups of them. Ties keep
    /// directory order (display name, then key).
    pub async fn rank_top(&self, metric: &str, limit: usize, month: Month) -> Result<Vec<RankedRegion>> {
        let metric: Metric = metric.parse()?;
        if !(1..=MAX_RANK_LIMIT).contains(&limit) {
            return Err(Error::InvalidInput(format!(
                "Limit must be between 1 and {}",
                MAX_RANK_LIMIT
            )));
        }

        let regions = self.reference_regions().await;
        info!(metric = %metric, limit, regions = regions.len(), month = %month, "Ranking regions");

        let performances = self.resolve_regions(&regions, month).await;
        let mut ranked: Vec<(usize, RankedRegion)> = regions
            .into_iter()
            .zip(performances)
            .map(|(region, performance)| RankedRegion { region, performance })
            .enumerate()
            .collect();

        ranked.sort_by(|(ia, a), (ib, b)| {
            metric
                .value(&b.performance)
                .total_cmp(&metric.value(&a.performance))
                .then(ia.cmp(ib))
        });

        Ok(ranked
            .into_iter()
            .take(limit)
            .map(|(_, entry)| entry)
            .collect())
    }

    /// Sum the children of `parent_key` for one month
    ///
    /// An unknown parent has no children and yields an all-zero summary.
    pub async fn regional_summary(&self, parent_key: &str, month: Month) -> Result<RegionalSummary> {
        let parent_key = validate_region_key(parent_key)?;

        let children = match self.regions.list_children(parent_key).await {
            Ok(children) => children,
            Err(e) => {
                warn!(parent = parent_key, error = %e, "Region lookup failed, summarising no children");
                Vec::new()
            }
        };
        info!(parent = parent_key, children = children.len(), month = %month, "Summarising region");

        let records = self.resolve_regions(&children, month).await;

        let mut summary = RegionalSummary {
            parent_region_key: parent_key.to_string(),
            month,
            child_count: children.len(),
            total_workers: 0,
            total_active_workers: 0,
            total_expenditure: 0.0,
            total_person_days: 0,
            average_wage: 0.0,
        };
        for record in &records {
            summary.total_workers += record.total_workers;
            summary.total_active_workers += record.active_workers;
            summary.total_expenditure += record.total_expenditure;
            summary.total_person_days += record.person_days_generated;
        }
        if summary.total_person_days > 0 {
            summary.average_wage =
                summary.total_expenditure * CRORE / summary.total_person_days as f64;
        }

        Ok(summary)
    }

    /// `months_back` consecutive months ending at the current month, oldest first
    pub async fn historical_series(
        &self,
        region_key: &str,
        months_back: u32,
    ) -> Result<Vec<PerformanceRecord>> {
        let end = Month::current(self.clock.as_ref());
        self.historical_series_ending(region_key, months_back, end).await
    }

    /// `months_back` consecutive months ending at `end`, oldest first
    pub async fn historical_series_ending(
        &self,
        region_key: &str,
        months_back: u32,
        end: Month,
    ) -> Result<Vec<PerformanceRecord>> {
        let region_key = validate_region_key(region_key)?;
        if !(1..=MAX_HISTORY_MONTHS).contains(&months_back) {
            return Err(Error::InvalidInput(format!(
                "Months must be between 1 and {}",
                MAX_HISTORY_MONTHS
            )));
        }

        info!(region = region_key, months = months_back, end = %end, "Fetching historical series");

        let months: Vec<Month> = (0..months_back).rev().map(|i| end.minus_months(i)).collect();
        let resolver = self.resolver.as_ref();

        let records: Vec<PerformanceRecord> = stream::iter(months)
            .map(|month| async move { resolver.resolve(region_key, month).await })
            .buffered(self.fan_out)
            .collect()
            .await;

        Ok(records)
    }

    /// Leaf regions; an unavailable directory reads as empty
    async fn reference_regions(&self) -> Vec<Region> {
        match self.regions.list_leaves().await {
            Ok(regions) => regions,
            Err(e) => {
                warn!(error = %e, "Region lookup failed, ranking no regions");
                Vec::new()
            }
        }
    }

    /// Resolve each region for `month`, results in input order
    async fn resolve_regions(&self, regions: &[Region], month: Month) -> Vec<PerformanceRecord> {
        let resolver = self.resolver.as_ref();

        stream::iter(regions)
            .map(|region| async move { resolver.resolve(&region.region_key, month).await })
            .buffered(self.fan_out)
            .collect()
            .await
    }
}

/// Trimmed, non-empty region key
fn validate_region_key(region_key: &str) -> Result<&str> {
    let trimmed = region_key.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("Region key is required".to_string()));
    }
    Ok(trimmed)
}
