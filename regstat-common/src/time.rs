//! Calendar month normalization and clocks
//!
//! Performance records are scoped to a calendar month. Any two timestamps in the
//! same month are equivalent, so every date entering the system is normalized to
//! the first day of its month before it is used as a key.

use crate::{Error, Result};
use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Source of the current time
///
/// Injected wherever expiry or "current month" matters so tests can pin time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// A calendar month, always held as the first day of that month
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Month(NaiveDate);

impl Month {
    /// Normalize any date to its month
    pub fn from_date(date: NaiveDate) -> Self {
        // Day 1 exists in every month
        Self(date.with_day(1).unwrap_or(date))
    }

    /// Build from a year and a 1-based month number
    pub fn from_ym(year: i32, month: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(Self)
            .ok_or_else(|| Error::InvalidInput(format!("Invalid month: {}-{:02}", year, month)))
    }

    /// Month containing the clock's current instant (UTC)
    pub fn current(clock: &dyn Clock) -> Self {
        Self::from_date(clock.now().date_naive())
    }

    /// Parse `YYYY-MM`, `YYYY-MM-DD` or an RFC 3339 timestamp
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();

        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Ok(Self::from_date(date));
        }
        // The month named by the timestamp's own offset, not the UTC one
        if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self::from_date(ts.date_naive()));
        }
        if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", trimmed), "%Y-%m-%d") {
            return Ok(Self::from_date(date));
        }

        Err(Error::InvalidInput(format!(
            "Invalid month format '{}'. Use YYYY-MM or YYYY-MM-DD",
            input
        )))
    }

    /// First day of the month
    pub fn first_day(&self) -> NaiveDate {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// 1-based month-of-year (1 = January)
    pub fn index(&self) -> u32 {
        self.0.month()
    }

    /// `n` months earlier
    pub fn minus_months(&self, n: u32) -> Self {
        self.0
            .checked_sub_months(Months::new(n))
            .map(Self)
            .unwrap_or(*self)
    }

    /// `YYYY-MM`, used in cache keys
    pub fn cache_suffix(&self) -> String {
        self.0.format("%Y-%m").to_string()
    }

    /// `YYYY-MM-DD`, used in the `region_performance.month` column
    pub fn to_db_string(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cache_suffix())
    }
}

impl TryFrom<String> for Month {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Month::parse(&value)
    }
}

impl From<Month> for String {
    fn from(month: Month) -> Self {
        month.to_db_string()
    }
}
