//! SQLite-backed [`MediaLedger`].

use std::sync::Arc;

use async_trait::async_trait;
use relaypost_common::storage::SqliteConnection;
use relaypost_core::MediaLedger;
use relaypost_domain::constants::{truncate_error, STUCK_UPLOAD_MARKER};
use relaypost_domain::{now_ts, MediaRef, MediaSyncRecord, MediaSyncStatus, RelayPostError, Result};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use tokio::task;
use tracing::{debug, instrument};

use super::manager::{
    i64_to_u32, i64_to_u64, map_join_error, map_sql_error, parse_column, u64_to_i64, DbManager,
};

pub struct SqliteMediaLedger {
    db: Arc<DbManager>,
}

impl SqliteMediaLedger {
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
impl MediaLedger for SqliteMediaLedger {
    async fn get(&self, target_id: &str, media_id: u64) -> Result<Option<MediaSyncRecord>> {
        let target_id = target_id.to_string();
        let media = u64_to_i64(media_id)?;
        self.blocking(move |conn| fetch_media(conn, &target_id, media)).await
    }

    #[instrument(skip(self, media), fields(media_id = media.id))]
    async fn begin(&self, target_id: &str, media: &MediaRef) -> Result<MediaSyncRecord> {
        let target_id = target_id.to_string();
        let media_id = u64_to_i64(media.id)?;
        let local_url = media.source_url.clone();
        self.blocking(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;
            tx.execute(BEGIN_SQL, params![target_id, media_id, local_url, now_ts()])
                .map_err(map_sql_error)?;
            let record = fetch_media(&tx, &target_id, media_id)?
                .ok_or_else(|| RelayPostError::Internal("upserted media record vanished".into()))?;
            tx.commit().map_err(map_sql_error)?;
            Ok(record)
        })
        .await
    }

    #[instrument(skip(self, remote, error))]
    async fn transition(
        &self,
        target_id: &str,
        media_id: u64,
        status: MediaSyncStatus,
        remote: Option<(u64, String)>,
        error: Option<&str>,
    ) -> Result<MediaSyncRecord> {
        let target_id = target_id.to_string();
        let media = u64_to_i64(media_id)?;
        let (remote_id, remote_url) = match remote {
            Some((id, url)) => (Some(u64_to_i64(id)?), Some(url)),
            None => (None, None),
        };
        let error = error.map(truncate_error);
        self.blocking(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;
            let current = fetch_media(&tx, &target_id, media)?.ok_or_else(|| {
                RelayPostError::NotFound(format!("media record {target_id}/{media}"))
            })?;
            if !current.accepts(status) {
                return Err(RelayPostError::InvalidInput(format!(
                    "invalid media transition {} -> {}",
                    current.status, status
                )));
            }
            tx.execute(
                TRANSITION_SQL,
                params![target_id, media, status.as_str(), now_ts(), remote_id, remote_url, error],
            )
            .map_err(map_sql_error)?;
            let record = fetch_media(&tx, &target_id, media)?.ok_or_else(|| {
                RelayPostError::Internal("transitioned media record vanished".into())
            })?;
            tx.commit().map_err(map_sql_error)?;
            Ok(record)
        })
        .await
    }

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

    #[instrument(skip(self))]
    async fn sweep_stuck(&self, older_than: i64) -> Result<u64> {
        self.blocking(move |conn| {
            let changed = conn
                .execute(SWEEP_STUCK_SQL, params![older_than, STUCK_UPLOAD_MARKER, now_ts()])
                .map_err(map_sql_error)?;
            if changed > 0 {
                debug!(changed, "failed stuck media uploads");
            }
            Ok(changed as u64)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn purge_succeeded(&self, older_than: i64) -> Result<u64> {
        self.blocking(move |conn| {
            let removed = conn.execute(PURGE_SQL, params![older_than]).map_err(map_sql_error)?;
            Ok(removed as u64)
        })
        .await
    }
}

// ============================================================================
// SQL Operations (synchronous)
// ============================================================================

const MEDIA_COLUMNS: &str = "id, target_id, media_id, local_url, remote_id, remote_url, status, \
     retry_count, last_error, created_at, updated_at, synced_at";

/// Successful uploads are left untouched so a finished record is never
/// re-uploaded; anything else goes back to pending.
const BEGIN_SQL: &str = "INSERT INTO media_sync_records
        (target_id, media_id, local_url, status, retry_count, created_at, updated_at)
    VALUES (?1, ?2, ?3, 'pending', 0, ?4, ?4)
    ON CONFLICT(target_id, media_id) DO UPDATE SET
        status = CASE WHEN status = 'success' THEN status ELSE 'pending' END,
        local_url = excluded.local_url,
        updated_at = excluded.updated_at";

const TRANSITION_SQL: &str = "UPDATE media_sync_records SET
        status = ?3,
        updated_at = ?4,
        remote_id = COALESCE(?5, remote_id),
        remote_url = COALESCE(?6, remote_url),
        retry_count = retry_count + CASE WHEN ?3 = 'failed' THEN 1 ELSE 0 END,
        last_error = CASE
            WHEN ?3 = 'failed' THEN ?7
            WHEN ?3 = 'success' THEN NULL
            ELSE last_error
        END,
        synced_at = CASE WHEN ?3 = 'success' THEN ?4 ELSE synced_at END
    WHERE target_id = ?1 AND media_id = ?2";

const RETRY_FAILED_SQL: &str = "UPDATE media_sync_records
    SET status = 'pending', updated_at = ?3
    WHERE target_id = ?1 AND status = 'failed' AND retry_count < ?2";

const SWEEP_STUCK_SQL: &str = "UPDATE media_sync_records
    SET status = 'failed', retry_count = retry_count + 1, last_error = ?2, updated_at = ?3
    WHERE status = 'uploading' AND updated_at < ?1";

const PURGE_SQL: &str = "DELETE FROM media_sync_records
    WHERE status = 'success' AND synced_at IS NOT NULL AND synced_at < ?1";

fn fetch_media(
    conn: &rusqlite::Connection,
    target_id: &str,
    media_id: i64,
) -> Result<Option<MediaSyncRecord>> {
    let sql = format!(
        "SELECT {MEDIA_COLUMNS} FROM media_sync_records WHERE target_id = ?1 AND media_id = ?2"
    );
    conn.query_row(&sql, params![target_id, media_id], map_media_row)
        .optional()
        .map_err(map_sql_error)
}

fn map_media_row(row: &Row<'_>) -> rusqlite::Result<MediaSyncRecord> {
    let status: String = row.get(6)?;
    Ok(MediaSyncRecord {
        id: row.get(0)?,
        target_id: row.get(1)?,
        media_id: i64_to_u64(row.get(2)?),
        local_url: row.get(3)?,
        remote_id: row.get::<_, Option<i64>>(4)?.map(i64_to_u64),
        remote_url: row.get(5)?,
        status: parse_column::<MediaSyncStatus>(6, &status)?,
        retry_count: i64_to_u32(row.get(7)?),
        last_error: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        synced_at: row.get(11)?,
    })
}
