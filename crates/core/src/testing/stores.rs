//! In-memory ledgers, repositories and sources.
//!
//! Transition rules mirror the SQLite adapters so core tests exercise the
//! same state machine.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use relaypost_domain::constants::{truncate_error, STUCK_SYNC_MARKER, STUCK_UPLOAD_MARKER};
use relaypost_domain::{
    now_ts, ContentItem, MediaRef, MediaSyncRecord, MediaSyncStatus, RelayPostError, Result,
    SyncKind, SyncRecord, SyncStats, SyncStatus, SyncTask, Target, TaskStatus, TaxonomyKind,
    TermMapping, TermRef,
};

use crate::sync::ports::{
    ContentSource, CredentialStore, MediaAsset, MediaLedger, MediaSource, SyncLedger, TaskQueue,
    TargetRepository, TermMappingStore,
};

fn not_found(what: String) -> RelayPostError {
    RelayPostError::NotFound(what)
}

/// In-memory [`SyncLedger`].
#[derive(Debug, Default)]
pub struct MemorySyncLedger {
    rows: Mutex<Vec<SyncRecord>>,
}

impl MemorySyncLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<SyncRecord> {
        self.rows.lock().clone()
    }

    /// Backdate a record's `updated_at`, for sweep tests.
    pub fn set_updated_at(&self, target_id: &str, item_id: u64, at: i64) {
        if let Some(row) = self
            .rows
            .lock()
            .iter_mut()
            .find(|r| r.target_id == target_id && r.item_id == item_id)
        {
            row.updated_at = at;
        }
    }
}

#[async_trait]
impl SyncLedger for MemorySyncLedger {
    async fn create_or_reset(
        &self,
        target_id: &str,
        item_id: u64,
        kind: SyncKind,
        scheduled_at: Option<i64>,
    ) -> Result<SyncRecord> {
        let now = now_ts();
        let mut rows = self.rows.lock();
        if let Some(row) = rows.iter_mut().find(|r| r.target_id == target_id && r.item_id == item_id)
        {
            row.status = SyncStatus::Pending;
            row.kind = kind;
            row.scheduled_at = scheduled_at;
            row.started_at = now;
            row.updated_at = now;
            return Ok(row.clone());
        }

        let record = SyncRecord {
            id: rows.len() as i64 + 1,
            target_id: target_id.to_string(),
            item_id,
            remote_id: None,
            status: SyncStatus::Pending,
            kind,
            scheduled_at,
            retry_count: 0,
            last_error: None,
            created_at: now,
            started_at: now,
            updated_at: now,
            synced_at: None,
        };
        rows.push(record.clone());
        Ok(record)
    }

    async fn transition(
        &self,
        target_id: &str,
        item_id: u64,
        status: SyncStatus,
        remote_id: Option<u64>,
        error: Option<&str>,
    ) -> Result<SyncRecord> {
        let now = now_ts();
        let mut rows = self.rows.lock();
        let row = rows
            .iter_mut()
            .find(|r| r.target_id == target_id && r.item_id == item_id)
            .ok_or_else(|| not_found(format!("sync record {target_id}/{item_id}")))?;

        if !row.accepts(status) {
            return Err(RelayPostError::InvalidInput(format!(
                "invalid sync transition {} -> {}",
                row.status, status
            )));
        }

        row.status = status;
        row.updated_at = now;
        if remote_id.is_some() {
            row.remote_id = remote_id;
        }
        match status {
            SyncStatus::Failed => {
                row.retry_count += 1;
                row.last_error = error.map(truncate_error);
            }
            SyncStatus::Success => {
                row.last_error = None;
                row.synced_at = Some(now);
            }
            SyncStatus::Pending | SyncStatus::Syncing => {}
        }
        Ok(row.clone())
    }

    async fn get(&self, target_id: &str, item_id: u64) -> Result<Option<SyncRecord>> {
        Ok(self
            .rows
            .lock()
            .iter()
            .find(|r| r.target_id == target_id && r.item_id == item_id)
            .cloned())
    }

    async fn get_remote_id(&self, target_id: &str, item_id: u64) -> Result<Option<u64>> {
        Ok(self.get(target_id, item_id).await?.and_then(|r| r.remote_id))
    }

    async fn retry_failed(&self, target_id: &str, max_retries: u32) -> Result<u64> {
        let now = now_ts();
        let mut count = 0;
        for row in self.rows.lock().iter_mut().filter(|r| {
            r.target_id == target_id
                && r.status == SyncStatus::Failed
                && r.retry_count < max_retries
        }) {
            row.status = SyncStatus::Pending;
            row.updated_at = now;
            count += 1;
        }
        Ok(count)
    }

    async fn list_for_target(
        &self,
        target_id: &str,
        status: Option<SyncStatus>,
    ) -> Result<Vec<SyncRecord>> {
        Ok(self
            .rows
            .lock()
            .iter()
            .filter(|r| r.target_id == target_id && status.map_or(true, |s| r.status == s))
            .cloned()
            .collect())
    }

    async fn sweep_stuck(&self, older_than: i64) -> Result<u64> {
        let now = now_ts();
        let mut count = 0;
        for row in self
            .rows
            .lock()
            .iter_mut()
            .filter(|r| r.status == SyncStatus::Syncing && r.updated_at < older_than)
        {
            row.status = SyncStatus::Failed;
            row.retry_count += 1;
            row.last_error = Some(STUCK_SYNC_MARKER.to_string());
            row.updated_at = now;
            count += 1;
        }
        Ok(count)
    }

    async fn stats(&self, target_id: Option<&str>) -> Result<SyncStats> {
        let rows = self.rows.lock();
        let mut stats = SyncStats::default();
        let mut durations = Vec::new();
        for row in rows.iter().filter(|r| target_id.map_or(true, |t| r.target_id == t)) {
            match row.status {
                SyncStatus::Pending => stats.pending += 1,
                SyncStatus::Syncing => stats.syncing += 1,
                SyncStatus::Success => {
                    stats.success += 1;
                    if let Some(synced_at) = row.synced_at {
                        durations.push((synced_at - row.started_at) as f64);
                    }
                }
                SyncStatus::Failed => stats.failed += 1,
            }
        }
        if !durations.is_empty() {
            stats.avg_seconds_to_success =
                Some(durations.iter().sum::<f64>() / durations.len() as f64);
        }
        Ok(stats)
    }
}

/// In-memory [`MediaLedger`].
#[derive(Debug, Default)]
pub struct MemoryMediaLedger {
    rows: Mutex<Vec<MediaSyncRecord>>,
}

impl MemoryMediaLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<MediaSyncRecord> {
        self.rows.lock().clone()
    }

    pub fn set_timestamps(&self, target_id: &str, media_id: u64, at: i64) {
        if let Some(row) = self
            .rows
            .lock()
            .iter_mut()
            .find(|r| r.target_id == target_id && r.media_id == media_id)
        {
            row.updated_at = at;
            if row.synced_at.is_some() {
                row.synced_at = Some(at);
            }
        }
    }
}

#[async_trait]
impl MediaLedger for MemoryMediaLedger {
    async fn get(&self, target_id: &str, media_id: u64) -> Result<Option<MediaSyncRecord>> {
        Ok(self
            .rows
            .lock()
            .iter()
            .find(|r| r.target_id == target_id && r.media_id == media_id)
            .cloned())
    }

    async fn begin(&self, target_id: &str, media: &MediaRef) -> Result<MediaSyncRecord> {
        let now = now_ts();
        let mut rows = self.rows.lock();
        if let Some(row) =
            rows.iter_mut().find(|r| r.target_id == target_id && r.media_id == media.id)
        {
            if row.status != MediaSyncStatus::Success {
                row.status = MediaSyncStatus::Pending;
            }
            row.local_url = media.source_url.clone();
            row.updated_at = now;
            return Ok(row.clone());
        }

        let record = MediaSyncRecord {
            id: rows.len() as i64 + 1,
            target_id: target_id.to_string(),
            media_id: media.id,
            local_url: media.source_url.clone(),
            remote_id: None,
            remote_url: None,
            status: MediaSyncStatus::Pending,
            retry_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            synced_at: None,
        };
        rows.push(record.clone());
        Ok(record)
    }

    async fn transition(
        &self,
        target_id: &str,
        media_id: u64,
        status: MediaSyncStatus,
        remote: Option<(u64, String)>,
        error: Option<&str>,
    ) -> Result<MediaSyncRecord> {
        let now = now_ts();
        let mut rows = self.rows.lock();
        let row = rows
            .iter_mut()
            .find(|r| r.target_id == target_id && r.media_id == media_id)
            .ok_or_else(|| not_found(format!("media record {target_id}/{media_id}")))?;

        if !row.accepts(status) {
            return Err(RelayPostError::InvalidInput(format!(
                "invalid media transition {} -> {}",
                row.status, status
            )));
        }

        row.status = status;
        row.updated_at = now;
        if let Some((remote_id, remote_url)) = remote {
            row.remote_id = Some(remote_id);
            row.remote_url = Some(remote_url);
        }
        match status {
            MediaSyncStatus::Failed => {
                row.retry_count += 1;
                row.last_error = error.map(truncate_error);
            }
            MediaSyncStatus::Success => {
                row.last_error = None;
                row.synced_at = Some(now);
            }
            MediaSyncStatus::Pending | MediaSyncStatus::Uploading => {}
        }
        Ok(row.clone())
    }

    async fn retry_failed(&self, target_id: &str, max_retries: u32) -> Result<u64> {
        let now = now_ts();
        let mut count = 0;
        for row in self.rows.lock().iter_mut().filter(|r| {
            r.target_id == target_id
                && r.status == MediaSyncStatus::Failed
                && r.retry_count < max_retries
        }) {
            row.status = MediaSyncStatus::Pending;
            row.updated_at = now;
            count += 1;
        }
        Ok(count)
    }

    async fn sweep_stuck(&self, older_than: i64) -> Result<u64> {
        let now = now_ts();
        let mut count = 0;
        for row in self
            .rows
            .lock()
            .iter_mut()
            .filter(|r| r.status == MediaSyncStatus::Uploading && r.updated_at < older_than)
        {
            row.status = MediaSyncStatus::Failed;
            row.retry_count += 1;
            row.last_error = Some(STUCK_UPLOAD_MARKER.to_string());
            row.updated_at = now;
            count += 1;
        }
        Ok(count)
    }

    async fn purge_succeeded(&self, older_than: i64) -> Result<u64> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|r| {
            !(r.status == MediaSyncStatus::Success
                && r.synced_at.is_some_and(|synced| synced < older_than))
        });
        Ok((before - rows.len()) as u64)
    }
}

/// In-memory [`TermMappingStore`].
#[derive(Debug, Default)]
pub struct MemoryTermMappings {
    rows: Mutex<HashMap<(String, TaxonomyKind, u64), TermMapping>>,
}

impl MemoryTermMappings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TermMappingStore for MemoryTermMappings {
    async fn get(
        &self,
        target_id: &str,
        kind: TaxonomyKind,
        local_id: u64,
    ) -> Result<Option<TermMapping>> {
        Ok(self.rows.lock().get(&(target_id.to_string(), kind, local_id)).cloned())
    }

    async fn save(&self, mapping: &TermMapping) -> Result<()> {
        self.rows.lock().insert(
            (mapping.target_id.clone(), mapping.taxonomy, mapping.local_id),
            mapping.clone(),
        );
        Ok(())
    }

    async fn remove_for_target(&self, target_id: &str) -> Result<u64> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|(target, _, _), _| target != target_id);
        Ok((before - rows.len()) as u64)
    }
}

/// In-memory [`TargetRepository`].
#[derive(Debug, Default)]
pub struct MemoryTargets {
    rows: Mutex<Vec<Target>>,
}

impl MemoryTargets {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TargetRepository for MemoryTargets {
    async fn save(&self, target: &Target) -> Result<()> {
        let mut rows = self.rows.lock();
        match rows.iter_mut().find(|t| t.id == target.id) {
            Some(existing) => *existing = target.clone(),
            None => rows.push(target.clone()),
        }
        Ok(())
    }

    async fn get(&self, target_id: &str) -> Result<Option<Target>> {
        Ok(self.rows.lock().iter().find(|t| t.id == target_id).cloned())
    }

    async fn list(&self, active_only: bool) -> Result<Vec<Target>> {
        Ok(self.rows.lock().iter().filter(|t| !active_only || t.active).cloned().collect())
    }

    async fn deactivate(&self, target_id: &str) -> Result<()> {
        let mut rows = self.rows.lock();
        let target = rows
            .iter_mut()
            .find(|t| t.id == target_id)
            .ok_or_else(|| not_found(format!("target {target_id}")))?;
        target.active = false;
        target.updated_at = now_ts();
        Ok(())
    }

    async fn delete(&self, target_id: &str) -> Result<()> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|t| t.id != target_id);
        if rows.len() == before {
            return Err(not_found(format!("target {target_id}")));
        }
        Ok(())
    }
}

/// In-memory [`CredentialStore`].
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn secret(&self, target_id: &str) -> Result<Option<String>> {
        Ok(self.secrets.lock().get(target_id).cloned())
    }

    async fn store(&self, target_id: &str, secret: &str) -> Result<()> {
        self.secrets.lock().insert(target_id.to_string(), secret.to_string());
        Ok(())
    }

    async fn remove(&self, target_id: &str) -> Result<()> {
        self.secrets.lock().remove(target_id);
        Ok(())
    }
}

/// In-memory [`ContentSource`].
#[derive(Debug, Default)]
pub struct MemoryContentSource {
    items: Mutex<HashMap<u64, ContentItem>>,
    terms: Mutex<HashMap<(TaxonomyKind, u64), TermRef>>,
}

impl MemoryContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_item(&self, item: ContentItem) {
        self.items.lock().insert(item.id, item);
    }

    pub fn insert_term(&self, kind: TaxonomyKind, term: TermRef) {
        self.terms.lock().insert((kind, term.id), term);
    }
}

#[async_trait]
impl ContentSource for MemoryContentSource {
    async fn get_item(&self, item_id: u64) -> Result<ContentItem> {
        self.items
            .lock()
            .get(&item_id)
            .cloned()
            .ok_or_else(|| not_found(format!("content item {item_id}")))
    }

    async fn get_term(&self, kind: TaxonomyKind, term_id: u64) -> Result<Option<TermRef>> {
        Ok(self.terms.lock().get(&(kind, term_id)).cloned())
    }
}

/// In-memory [`MediaSource`]; every asset is a small byte string unless
/// marked missing.
#[derive(Debug, Default)]
pub struct MemoryMediaSource {
    missing: Mutex<Vec<String>>,
}

impl MemoryMediaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_missing(&self, source_url: &str) {
        self.missing.lock().push(source_url.to_string());
    }
}

#[async_trait]
impl MediaSource for MemoryMediaSource {
    async fn load(&self, media: &MediaRef) -> Result<MediaAsset> {
        if self.missing.lock().iter().any(|url| url == &media.source_url) {
            return Err(not_found(format!("media file {}", media.source_url)));
        }
        Ok(MediaAsset { file_name: media.file_name(), bytes: media.source_url.as_bytes().to_vec() })
    }
}

/// In-memory [`TaskQueue`].
#[derive(Debug, Default)]
pub struct MemoryTaskQueue {
    tasks: Mutex<Vec<(SyncTask, Option<i64>)>>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> Vec<SyncTask> {
        self.tasks.lock().iter().map(|(task, _)| task.clone()).collect()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, task: &SyncTask) -> Result<String> {
        let mut tasks = self.tasks.lock();
        let waiting = tasks.iter().find(|(t, _)| {
            t.item_id == task.item_id
                && t.target_id == task.target_id
                && t.status == TaskStatus::Pending
        });
        if let Some((existing, _)) = waiting {
            return Ok(existing.id.clone());
        }
        tasks.push((task.clone(), None));
        Ok(task.id.clone())
    }

    async fn due(&self, limit: usize, now: i64) -> Result<Vec<SyncTask>> {
        let mut tasks = self.tasks.lock();
        let mut due: Vec<&mut (SyncTask, Option<i64>)> = tasks
            .iter_mut()
            .filter(|(t, _)| t.status == TaskStatus::Pending && t.run_at <= now)
            .collect();
        due.sort_by_key(|(t, _)| t.run_at);

        let mut claimed = Vec::new();
        for (task, claimed_at) in due.into_iter().take(limit) {
            task.status = TaskStatus::Running;
            task.attempts += 1;
            *claimed_at = Some(now);
            claimed.push(task.clone());
        }
        Ok(claimed)
    }

    async fn complete(&self, task_id: &str) -> Result<()> {
        self.set_status(task_id, TaskStatus::Done, None)
    }

    async fn fail(&self, task_id: &str, error: &str) -> Result<()> {
        self.set_status(task_id, TaskStatus::Failed, Some(truncate_error(error)))
    }

    async fn requeue_stale(&self, claimed_before: i64) -> Result<u64> {
        let mut count = 0;
        for (task, claimed_at) in self.tasks.lock().iter_mut() {
            if task.status == TaskStatus::Running && claimed_at.is_some_and(|at| at < claimed_before)
            {
                task.status = TaskStatus::Pending;
                *claimed_at = None;
                count += 1;
            }
        }
        Ok(count)
    }
}

impl MemoryTaskQueue {
    fn set_status(&self, task_id: &str, status: TaskStatus, error: Option<String>) -> Result<()> {
        let mut tasks = self.tasks.lock();
        let (task, _) = tasks
            .iter_mut()
            .find(|(t, _)| t.id == task_id)
            .ok_or_else(|| not_found(format!("task {task_id}")))?;
        task.status = status;
        if error.is_some() {
            task.last_error = error;
        }
        Ok(())
    }
}
