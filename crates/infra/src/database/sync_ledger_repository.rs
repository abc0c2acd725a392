//! SQLite-backed [`SyncLedger`].
//!
//! One row per (target, item). Status changes run inside an immediate
//! transaction so the state-machine check and the write see the same row.

use std::sync::Arc;

use async_trait::async_trait;
use relaypost_common::storage::SqliteConnection;
use relaypost_core::SyncLedger;
use relaypost_domain::constants::{truncate_error, STUCK_SYNC_MARKER};
use relaypost_domain::{
    now_ts, RelayPostError, Result, SyncKind, SyncRecord, SyncStats, SyncStatus,
};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use tokio::task;
use tracing::{debug, instrument};

use super::manager::{
    i64_to_u32, i64_to_u64, map_join_error, map_sql_error, parse_column, u64_to_i64, DbManager,
};

pub struct SqliteSyncLedger {
    db: Arc<DbManager>,
}

impl SqliteSyncLedger {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || -> Result<T> {
            let mut conn = db.get_connection()?;
            f(&mut conn)
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl SyncLedger for SqliteSyncLedger {
    #[instrument(skip(self))]
    async fn create_or_reset(
        &self,
        target_id: &str,
        item_id: u64,
        kind: SyncKind,
        scheduled_at: Option<i64>,
    ) -> Result<SyncRecord> {
        let target_id = target_id.to_string();
        let item = u64_to_i64(item_id)?;
        self.blocking(move |conn| upsert_pending(conn, &target_id, item, kind, scheduled_at))
            .await
    }

    #[instrument(skip(self, error))]
    async fn transition(
        &self,
        target_id: &str,
        item_id: u64,
        status: SyncStatus,
        remote_id: Option<u64>,
        error: Option<&str>,
    ) -> Result<SyncRecord> {
        let target_id = target_id.to_string();
        let item = u64_to_i64(item_id)?;
        let remote = remote_id.map(u64_to_i64).transpose()?;
        let error = error.map(truncate_error);
        self.blocking(move |conn| {
            apply_transition(conn, &target_id, item, status, remote, error.as_deref())
        })
        .await
    }

    async fn get(&self, target_id: &str, item_id: u64) -> Result<Option<SyncRecord>> {
        let target_id = target_id.to_string();
        let item = u64_to_i64(item_id)?;
        self.blocking(move |conn| fetch_record(conn, &target_id, item)).await
    }

    async fn get_remote_id(&self, target_id: &str, item_id: u64) -> Result<Option<u64>> {
        Ok(self.get(target_id, item_id).await?.and_then(|record| record.remote_id))
    }

    #[instrument(skip(self))]
    async fn retry_failed(&self, target_id: &str, max_retries: u32) -> Result<u64> {
        let target_id = target_id.to_string();
        self.blocking(move |conn| {
            let changed = conn
                .execute(RETRY_FAILED_SQL, params![target_id, max_retries, now_ts()])
                .map_err(map_sql_error)?;
            Ok(changed as u64)
        })
        .await
    }

    async fn list_for_target(
        &self,
        target_id: &str,
        status: Option<SyncStatus>,
    ) -> Result<Vec<SyncRecord>> {
        let target_id = target_id.to_string();
        let status = status.map(|s| s.as_str());
        self.blocking(move |conn| {
            let sql = format!(
                "SELECT {SYNC_COLUMNS} FROM sync_records
                 WHERE target_id = ?1 AND (?2 IS NULL OR status = ?2)
                 ORDER BY item_id"
            );
            let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![target_id, status], map_sync_row)
                .map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn sweep_stuck(&self, older_than: i64) -> Result<u64> {
        self.blocking(move |conn| {
            let changed = conn
                .execute(SWEEP_STUCK_SQL, params![older_than, STUCK_SYNC_MARKER, now_ts()])
                .map_err(map_sql_error)?;
            if changed > 0 {
                debug!(changed, "failed stuck sync records");
            }
            Ok(changed as u64)
        })
        .await
    }

    async fn stats(&self, target_id: Option<&str>) -> Result<SyncStats> {
        let target_id = target_id.map(str::to_string);
        self.blocking(move |conn| {
            conn.query_row(STATS_SQL, params![target_id], |row| {
                Ok(SyncStats {
                    pending: i64_to_u64(row.get(0)?),
                    syncing: i64_to_u64(row.get(1)?),
                    success: i64_to_u64(row.get(2)?),
                    failed: i64_to_u64(row.get(3)?),
                    avg_seconds_to_success: row.get(4)?,
                })
            })
            .map_err(map_sql_error)
        })
        .await
    }
}

// ============================================================================
// SQL Operations (synchronous)
// ============================================================================

const SYNC_COLUMNS: &str = "id, target_id, item_id, remote_id, status, kind, scheduled_at, \
     retry_count, last_error, created_at, started_at, updated_at, synced_at";

const UPSERT_PENDING_SQL: &str = "INSERT INTO sync_records
        (target_id, item_id, status, kind, scheduled_at, retry_count,
         created_at, started_at, updated_at)
    VALUES (?1, ?2, 'pending', ?3, ?4, 0, ?5, ?5, ?5)
    ON CONFLICT(target_id, item_id) DO UPDATE SET
        status = 'pending',
        kind = excluded.kind,
        scheduled_at = excluded.scheduled_at,
        started_at = excluded.started_at,
        updated_at = excluded.updated_at";

const TRANSITION_SQL: &str = "UPDATE sync_records SET
        status = ?3,
        updated_at = ?4,
        remote_id = COALESCE(?5, remote_id),
        retry_count = retry_count + CASE WHEN ?3 = 'failed' THEN 1 ELSE 0 END,
        last_error = CASE
            WHEN ?3 = 'failed' THEN ?6
            WHEN ?3 = 'success' THEN NULL
            ELSE last_error
        END,
        synced_at = CASE WHEN ?3 = 'success' THEN ?4 ELSE synced_at END
    WHERE target_id = ?1 AND item_id = ?2";

const RETRY_FAILED_SQL: &str = "UPDATE sync_records
    SET status = 'pending', updated_at = ?3
    WHERE target_id = ?1 AND status = 'failed' AND retry_count < ?2";

const SWEEP_STUCK_SQL: &str = "UPDATE sync_records
    SET status = 'failed', retry_count = retry_count + 1, last_error = ?2, updated_at = ?3
    WHERE status = 'syncing' AND updated_at < ?1";

const STATS_SQL: &str = "SELECT
        COALESCE(SUM(status = 'pending'), 0),
        COALESCE(SUM(status = 'syncing'), 0),
        COALESCE(SUM(status = 'success'), 0),
        COALESCE(SUM(status = 'failed'), 0),
        AVG(CASE WHEN status = 'success' AND synced_at IS NOT NULL
                 THEN CAST(synced_at - started_at AS REAL) END)
    FROM sync_records
    WHERE ?1 IS NULL OR target_id = ?1";

fn upsert_pending(
    conn: &mut SqliteConnection,
    target_id: &str,
    item_id: i64,
    kind: SyncKind,
    scheduled_at: Option<i64>,
) -> Result<SyncRecord> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(map_sql_error)?;
    tx.execute(UPSERT_PENDING_SQL, params![target_id, item_id, kind.as_str(), scheduled_at, now_ts()])
        .map_err(map_sql_error)?;
    let record = fetch_record(&tx, target_id, item_id)?
        .ok_or_else(|| RelayPostError::Internal("upserted sync record vanished".into()))?;
    tx.commit().map_err(map_sql_error)?;
    Ok(record)
}

fn apply_transition(
    conn: &mut SqliteConnection,
    target_id: &str,
    item_id: i64,
    status: SyncStatus,
    remote_id: Option<i64>,
    error: Option<&str>,
) -> Result<SyncRecord> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(map_sql_error)?;
    let current = fetch_record(&tx, target_id, item_id)?.ok_or_else(|| {
        RelayPostError::NotFound(format!("sync record {target_id}/{item_id}"))
    })?;
    if !current.accepts(status) {
        return Err(RelayPostError::InvalidInput(format!(
            "invalid sync transition {} -> {}",
            current.status, status
        )));
    }
    tx.execute(
        TRANSITION_SQL,
        params![target_id, item_id, status.as_str(), now_ts(), remote_id, error],
    )
    .map_err(map_sql_error)?;
    let record = fetch_record(&tx, target_id, item_id)?
        .ok_or_else(|| RelayPostError::Internal("transitioned sync record vanished".into()))?;
    tx.commit().map_err(map_sql_error)?;
    Ok(record)
}

fn fetch_record(
    conn: &rusqlite::Connection,
    target_id: &str,
    item_id: i64,
) -> Result<Option<SyncRecord>> {
    let sql =
        format!("SELECT {SYNC_COLUMNS} FROM sync_records WHERE target_id = ?1 AND item_id = ?2");
    conn.query_row(&sql, params![target_id, item_id], map_sync_row)
        .optional()
        .map_err(map_sql_error)
}

fn map_sync_row(row: &Row<'_>) -> rusqlite::Result<SyncRecord> {
    let status: String = row.get(4)?;
    let kind: String = row.get(5)?;
    Ok(SyncRecord {
        id: row.get(0)?,
        target_id: row.get(1)?,
        item_id: i64_to_u64(row.get(2)?),
        remote_id: row.get::<_, Option<i64>>(3)?.map(i64_to_u64),
        status: parse_column(4, &status)?,
        kind: parse_column(5, &kind)?,
        scheduled_at: row.get(6)?,
        retry_count: i64_to_u32(row.get(7)?),
        last_error: row.get(8)?,
        created_at: row.get(9)?,
        started_at: row.get(10)?,
        updated_at: row.get(11)?,
        synced_at: row.get(12)?,
    })
}
