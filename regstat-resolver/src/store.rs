//! Persisted performance records
//!
//! One current row per `(region_key, month)`. Writes are upserts: a second
//! write for the same key overwrites every measured field and restamps
//! `last_fetched_at`. No history is kept.

use async_trait::async_trait;
use regstat_common::db::PerformanceRecord;
use regstat_common::{Error, Month, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// Row-oriented store of resolved records
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find(&self, region_key: &str, month: Month) -> Result<Option<PerformanceRecord>>;

    /// Insert, or overwrite the existing row for the same region and month
    async fn upsert(&self, record: &PerformanceRecord) -> Result<()>;

    /// Insert only when no row exists; true if inserted
    async fn insert_if_absent(&self, record: &PerformanceRecord) -> Result<bool>;
}

/// Record store on the `region_performance` table
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of stored records
    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM region_performance")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    /// Earliest and latest stored month
    pub async fn month_range(&self) -> Result<Option<(Month, Month)>> {
        let (earliest, latest): (Option<String>, Option<String>) =
            sqlx::query_as("SELECT MIN(month), MAX(month) FROM region_performance")
                .fetch_one(&self.pool)
                .await?;

        match (earliest, latest) {
            (Some(earliest), Some(latest)) => {
                Ok(Some((Month::parse(&earliest)?, Month::parse(&latest)?)))
            }
            _ => Ok(None),
        }
    }
}

fn record_from_row(row: &SqliteRow) -> Result<PerformanceRecord> {
    let month: String = row.get("month");
    let month = Month::parse(&month)
        .map_err(|e| Error::Internal(format!("Corrupt month column '{}': {}", month, e)))?;

    Ok(PerformanceRecord {
        region_key: row.get("region_key"),
        month,
        total_workers: row.get("total_workers"),
        active_workers: row.get("active_workers"),
        job_cards_issued: row.get("job_cards_issued"),
        work_completed_pct: row.get("work_completed_pct"),
        average_wage: row.get("average_wage"),
        person_days_generated: row.get("person_days_generated"),
        total_expenditure: row.get("total_expenditure"),
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn find(&self, region_key: &str, month: Month) -> Result<Option<PerformanceRecord>> {
        let row = sqlx::query(
            r#"
            SELECT region_key, month, total_workers, active_workers, job_cards_issued,
                   work_completed_pct, average_wage, person_days_generated, total_expenditure
            FROM region_performance
            WHERE region_key = ? AND month = ?
            "#,
        )
        .bind(region_key)
        .bind(month.to_db_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn upsert(&self, record: &PerformanceRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO region_performance (
                region_key, month, total_workers, active_workers, job_cards_issued,
                work_completed_pct, average_wage, person_days_generated, total_expenditure,
                last_fetched_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
            ON CONFLICT(region_key, month) DO UPDATE SET
                total_workers = excluded.total_workers,
                active_workers = excluded.active_workers,
                job_cards_issued = excluded.job_cards_issued,
                work_completed_pct = excluded.work_completed_pct,
                average_wage = excluded.average_wage,
                person_days_generated = excluded.person_days_generated,
                total_expenditure = excluded.total_expenditure,
                last_fetched_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&record.region_key)
        .bind(record.month.to_db_string())
        .bind(record.total_workers)
        .bind(record.active_workers)
        .bind(record.job_cards_issued)
        .bind(record.work_completed_pct)
        .bind(record.average_wage)
        .bind(record.person_days_generated)
        .bind(record.total_expenditure)
        .execute(&self.pool)
        .await?;

        debug!(region = %record.region_key, month = %record.month, "Saved record");
        Ok(())
    }

    async fn insert_if_absent(&self, record: &PerformanceRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO region_performance (
                region_key, month, total_workers, active_workers, job_cards_issued,
                work_completed_pct, average_wage, person_days_generated, total_expenditure
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(region_key, month) DO NOTHING
            "#,
        )
        .bind(&record.region_key)
        .bind(record.month.to_db_string())
        .bind(record.total_workers)
        .bind(record.active_workers)
        .bind(record.job_cards_issued)
        .bind(record.work_completed_pct)
        .bind(record.average_wage)
        .bind(record.person_days_generated)
        .bind(record.total_expenditure)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
