//! Region reference data
//!
//! Read-only from the resolver's point of view; the only writer is the
//! `import-regions` maintenance command.

use async_trait::async_trait;
use regstat_common::db::Region;
use regstat_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use tracing::info;

/// Lookup of known regions
#[async_trait]
pub trait RegionDirectory: Send + Sync {
    /// Every region, ordered by display name then key
    async fn list_all(&self) -> Result<Vec<Region>>;

    async fn find_by_key(&self, region_key: &str) -> Result<Option<Region>>;

    /// Direct children of `parent_key`, in [`RegionDirectory::list_all`] order
    async fn list_children(&self, parent_key: &str) -> Result<Vec<Region>> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|r| r.parent_region_key.as_deref() == Some(parent_key))
            .collect())
    }

    /// Regions that are no other region's parent, in [`RegionDirectory::list_all`] order
    ///
    /// Rankings and jobs work on these; a state row is only ever a roll-up.
    async fn list_leaves(&self) -> Result<Vec<Region>> {
        let all = self.list_all().await?;
        let parents: HashSet<&str> = all
            .iter()
            .filter_map(|r| r.parent_region_key.as_deref())
            .collect();
        let leaves = all
            .iter()
            .filter(|r| !parents.contains(r.region_key.as_str()))
            .cloned()
            .collect();
        Ok(leaves)
    }
}

/// Region directory on the `regions` table
#[derive(Clone)]
pub struct SqliteRegionDirectory {
    pool: SqlitePool,
}

impl SqliteRegionDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or rename regions
    pub async fn upsert_regions(&self, regions: &[Region]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for region in regions {
            sqlx::query(
                r#"
                INSERT INTO regions (region_key, display_name, parent_region_key)
                VALUES (?, ?, ?)
                ON CONFLICT(region_key) DO UPDATE SET
                    display_name = excluded.display_name,
                    parent_region_key = excluded.parent_region_key
                "#,
            )
            .bind(&region.region_key)
            .bind(&region.display_name)
            .bind(&region.parent_region_key)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!("Imported {} regions", regions.len());
        Ok(regions.len() as u64)
    }

    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM regions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

/// Region listing for the `regions` command
///
/// `key` selects one region and fails with `NotFound` when it is unknown;
/// otherwise `parent` narrows the listing to that region's children.
pub async fn lookup_regions(
    directory: &dyn RegionDirectory,
    key: Option<&str>,
    parent: Option<&str>,
) -> Result<Vec<Region>> {
    if let Some(key) = key {
        let key = key.trim();
        return match directory.find_by_key(key).await? {
            Some(region) => Ok(vec![region]),
            None => Err(Error::NotFound(format!("Region '{}'", key))),
        };
    }

    match parent {
        Some(parent) => directory.list_children(parent.trim()).await,
        None => directory.list_all().await,
    }
}

fn region_from_row(row: &SqliteRow) -> Region {
    Region {
        region_key: row.get("region_key"),
        display_name: row.get("display_name"),
        parent_region_key: row.get("parent_region_key"),
    }
}

#[async_trait]
impl RegionDirectory for SqliteRegionDirectory {
    async fn list_all(&self) -> Result<Vec<Region>> {
        let rows = sqlx::query(
            r#"
            SELECT region_key, display_name, parent_region_key
            FROM regions
            ORDER BY display_name, region_key
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(region_from_row).collect())
    }

    async fn find_by_key(&self, region_key: &str) -> Result<Option<Region>> {
        let row = sqlx::query(
            "SELECT region_key, display_name, parent_region_key FROM regions WHERE region_key = ?",
        )
        .bind(region_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(region_from_row))
    }

    async fn list_children(&self, parent_key: &str) -> Result<Vec<Region>> {
        let rows = sqlx::query(
            r#"
            SELECT region_key, display_name, parent_region_key
            FROM regions
            WHERE parent_region_key = ?
            ORDER BY display_name, region_key
            "#,
        )
        .bind(parent_key)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(region_from_row).collect())
    }

    async fn list_leaves(&self) -> Result<Vec<Region>> {
        let rows = sqlx::query(
            r#"
            SELECT region_key, display_name, parent_region_key
            FROM regions r
            WHERE NOT EXISTS (
                SELECT 1 FROM regions c WHERE c.parent_region_key = r.region_key
            )
            ORDER BY display_name, region_key
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(region_from_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regstat_common::db::init_memory_database;

    fn region(key: &str, name: &str, parent: Option<&str>) -> Region {
        Region {
            region_key: key.to_string(),
            display_name: name.to_string(),
            parent_region_key: parent.map(str::to_string),
        }
    }

    async fn directory() -> SqliteRegionDirectory {
        let directory = SqliteRegionDirectory::new(init_memory_database().await.unwrap());
        directory
            .upsert_regions(&[
                region("UP", "Uttar Pradesh", None),
                region("UP_LUCKNOW", "Lucknow", Some("UP")),
                region("UP_AGRA", "Agra", Some("UP")),
                region("MH_PUNE", "Pune", Some("MH")),
            ])
            .await
            .unwrap();
        directory
    }

    #[tokio::test]
    async fn test_list_all_ordered_by_name() {
        let directory = directory().await;
        let keys: Vec<String> = directory
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.region_key)
            .collect();
        assert_eq!(keys, ["UP_AGRA", "UP_LUCKNOW", "MH_PUNE", "UP"]);
    }

    #[tokio::test]
    async fn test_find_by_key() {
        let directory = directory().await;
        assert_eq!(
            directory.find_by_key("UP_AGRA").await.unwrap(),
            Some(region("UP_AGRA", "Agra", Some("UP")))
        );
        assert_eq!(directory.find_by_key("NOPE").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_list_children() {
        let directory = directory().await;
        let children = directory.list_children("UP").await.unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].region_key, "UP_AGRA");
        assert!(directory.list_children("BR").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_leaves_skips_parents() {
        let directory = directory().await;
        let keys: Vec<String> = directory
            .list_leaves()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.region_key)
            .collect();
        // MH has children but no row of its own, so nothing to skip there
        assert_eq!(keys, ["UP_AGRA", "UP_LUCKNOW", "MH_PUNE"]);
    }

    #[tokio::test]
    async fn test_lookup_regions() {
        let directory = directory().await;

        let one = lookup_regions(&directory, Some(" UP_AGRA "), None).await.unwrap();
        assert_eq!(one, [region("UP_AGRA", "Agra", Some("UP"))]);

        let children = lookup_regions(&directory, None, Some("UP")).await.unwrap();
        assert_eq!(children.len(), 2);

        assert_eq!(lookup_regions(&directory, None, None).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_lookup_unknown_key_is_not_found() {
        let directory = directory().await;

        let err = lookup_regions(&directory, Some("UP_NOWHERE"), None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(err.to_string().contains("UP_NOWHERE"));
    }

    #[tokio::test]
    async fn test_upsert_renames() {
        let directory = directory().await;
        directory
            .upsert_regions(&[region("UP_AGRA", "Agra District", Some("UP"))])
            .await
            .unwrap();

        assert_eq!(directory.count().await.unwrap(), 4);
        let agra = directory.find_by_key("UP_AGRA").await.unwrap().unwrap();
        assert_eq!(agra.display_name, "Agra District");
    }
}
