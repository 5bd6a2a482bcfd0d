//! Database models

use crate::Month;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monthly performance of one region
///
/// Created by the synthetic generator or an upstream provider, persisted with
/// upsert-on-`(region_key, month)` semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    pub region_key: String,
    pub month: Month,
    pub total_workers: i64,
    pub active_workers: i64,
    pub job_cards_issued: i64,
    /// Nominally 0-100, not clamped
    pub work_completed_pct: f64,
    /// Currency units per person-day
    pub average_wage: f64,
    pub person_days_generated: i64,
    /// Crore (10,000,000) currency units
    pub total_expenditure: f64,
}

/// Administrative region (static reference data)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub region_key: String,
    pub display_name: String,
    pub parent_region_key: Option<String>,
}

/// One row of the result cache
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub cache_key: String,
    /// JSON-encoded payload
    pub payload: String,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Entries are logically absent from the instant `expires_at` is reached
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Cache occupancy counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total: u64,
    pub active: u64,
    pub expired: u64,
}
