//! SQLite-backed [`TermMappingStore`] fronted by a TTL cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use relaypost_core::TermMappingStore;
use relaypost_domain::constants::TERM_CACHE_TTL_SECS;
use relaypost_domain::{Result, TaxonomyKind, TermMapping};
use rusqlite::{params, OptionalExtension, Row};
use tokio::task;
use tracing::debug;

use super::manager::{i64_to_u64, map_join_error, map_sql_error, parse_column, u64_to_i64, DbManager};

type MappingKey = (String, TaxonomyKind, u64);

const CACHE_CAPACITY: u64 = 10_000;

pub struct SqliteTermMappings {
    db: Arc<DbManager>,
    cache: Cache<MappingKey, TermMapping>,
}

impl SqliteTermMappings {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self::with_ttl(db, Duration::from_secs(TERM_CACHE_TTL_SECS))
    }

    pub fn with_ttl(db: Arc<DbManager>, ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(CACHE_CAPACITY).time_to_live(ttl).build();
        Self { db, cache }
    }
}

#[async_trait]
impl TermMappingStore for SqliteTermMappings {
    async fn get(
        &self,
        target_id: &str,
        kind: TaxonomyKind,
        local_id: u64,
    ) -> Result<Option<TermMapping>> {
        let key = (target_id.to_string(), kind, local_id);
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(Some(hit));
        }

        let db = Arc::clone(&self.db);
        let target = target_id.to_string();
        let local = u64_to_i64(local_id)?;
        let found = task::spawn_blocking(move || -> Result<Option<TermMapping>> {
            let conn = db.get_connection()?;
            conn.query_row(SELECT_MAPPING_SQL, params![target, kind.as_str(), local], map_mapping_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)??;

        if let Some(mapping) = &found {
            self.cache.insert(key, mapping.clone()).await;
        }
        Ok(found)
    }

    async fn save(&self, mapping: &TermMapping) -> Result<()> {
        let db = Arc::clone(&self.db);
        let row = mapping.clone();
        let local = u64_to_i64(row.local_id)?;
        let remote = u64_to_i64(row.remote_id)?;
        let parent = row.remote_parent.map(u64_to_i64).transpose()?;
        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                UPSERT_MAPPING_SQL,
                params![
                    row.target_id,
                    row.taxonomy.as_str(),
                    local,
                    remote,
                    row.slug,
                    parent,
                    row.updated_at
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)??;

        self.cache
            .insert((mapping.target_id.clone(), mapping.taxonomy, mapping.local_id), mapping.clone())
            .await;
        Ok(())
    }

    async fn remove_for_target(&self, target_id: &str) -> Result<u64> {
        let db = Arc::clone(&self.db);
        let target = target_id.to_string();
        let removed = task::spawn_blocking(move || -> Result<u64> {
            let conn = db.get_connection()?;
            let removed = conn
                .execute("DELETE FROM term_mappings WHERE target_id = ?1", params![target])
                .map_err(map_sql_error)?;
            Ok(removed as u64)
        })
        .await
        .map_err(map_join_error)??;

        self.cache.invalidate_all();
        debug!(target_id, removed, "term mappings removed");
        Ok(removed)
    }
}

// ============================================================================
// SQL Operations (synchronous)
// ============================================================================

const SELECT_MAPPING_SQL: &str = "SELECT target_id, taxonomy, local_id, remote_id, slug,
        remote_parent, updated_at
    FROM term_mappings
    WHERE target_id = ?1 AND taxonomy = ?2 AND local_id = ?3";

const UPSERT_MAPPING_SQL: &str = "INSERT INTO term_mappings
        (target_id, taxonomy, local_id, remote_id, slug, remote_parent, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
    ON CONFLICT(target_id, taxonomy, local_id) DO UPDATE SET
        remote_id = excluded.remote_id,
        slug = excluded.slug,
        remote_parent = excluded.remote_parent,
        updated_at = excluded.updated_at";

fn map_mapping_row(row: &Row<'_>) -> rusqlite::Result<TermMapping> {
    let taxonomy: String = row.get(1)?;
    Ok(TermMapping {
        target_id: row.get(0)?,
        taxonomy: parse_column(1, &taxonomy)?,
        local_id: i64_to_u64(row.get(2)?),
        remote_id: i64_to_u64(row.get(3)?),
        slug: row.get(4)?,
        remote_parent: row.get::<_, Option<i64>>(5)?.map(i64_to_u64),
        updated_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use relaypost_domain::now_ts;
    use tempfile::TempDir;

    use super::*;
    use crate::database::test_support::{manager_with_targets, OTHER, TARGET};

    fn mapping(target: &str, kind: TaxonomyKind, local_id: u64, remote_id: u64) -> TermMapping {
        TermMapping {
            target_id: target.into(),
            taxonomy: kind,
            local_id,
            remote_id,
            slug: format!("term-{local_id}"),
            remote_parent: None,
            updated_at: now_ts(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn saves_and_reads_mappings_per_taxonomy() {
        let dir = TempDir::new().unwrap();
        let store = SqliteTermMappings::new(manager_with_targets(&dir, &[TARGET]));

        store.save(&mapping(TARGET, TaxonomyKind::Category, 1, 10)).await.unwrap();
        store.save(&mapping(TARGET, TaxonomyKind::Tag, 1, 20)).await.unwrap();

        let category = store.get(TARGET, TaxonomyKind::Category, 1).await.unwrap().unwrap();
        let tag = store.get(TARGET, TaxonomyKind::Tag, 1).await.unwrap().unwrap();
        assert_eq!(category.remote_id, 10);
        assert_eq!(tag.remote_id, 20);
        assert!(store.get(TARGET, TaxonomyKind::Tag, 2).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn save_overwrites_and_refreshes_cache() {
        let dir = TempDir::new().unwrap();
        let store = SqliteTermMappings::new(manager_with_targets(&dir, &[TARGET]));

        store.save(&mapping(TARGET, TaxonomyKind::Category, 1, 10)).await.unwrap();
        store.get(TARGET, TaxonomyKind::Category, 1).await.unwrap();
        let mut moved = mapping(TARGET, TaxonomyKind::Category, 1, 11);
        moved.remote_parent = Some(3);
        store.save(&moved).await.unwrap();

        assert_eq!(store.get(TARGET, TaxonomyKind::Category, 1).await.unwrap(), Some(moved));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remove_for_target_leaves_other_targets() {
        let dir = TempDir::new().unwrap();
        let store = SqliteTermMappings::new(manager_with_targets(&dir, &[TARGET, OTHER]));

        store.save(&mapping(TARGET, TaxonomyKind::Tag, 1, 10)).await.unwrap();
        store.save(&mapping(OTHER, TaxonomyKind::Tag, 1, 30)).await.unwrap();
        store.get(TARGET, TaxonomyKind::Tag, 1).await.unwrap();

        assert_eq!(store.remove_for_target(TARGET).await.unwrap(), 1);
        assert!(store.get(TARGET, TaxonomyKind::Tag, 1).await.unwrap().is_none());
        assert_eq!(store.get(OTHER, TaxonomyKind::Tag, 1).await.unwrap().unwrap().remote_id, 30);
    }
}
