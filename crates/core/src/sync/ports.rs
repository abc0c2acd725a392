//! Port interfaces for sync operations
//!
//! Storage ports return the domain `Result`; the remote client returns
//! [`SyncError`] directly because its failures feed the per-target error map.

use std::collections::BTreeMap;

use async_trait::async_trait;
use relaypost_domain::{
    ContentItem, Credentials, MediaRef, MediaSyncRecord, MediaSyncStatus, Result, Settings,
    SyncKind, SyncRecord, SyncStats, SyncStatus, SyncTask, Target, TaxonomyKind, TermMapping,
    TermRef,
};

use super::errors::SyncError;
use super::payload::PostPayload;

/// Raw HTTP response handed to the response interpreter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// Header names are stored lowercased.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, headers: BTreeMap::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body parsed as JSON, `None` when empty or malformed.
    pub fn json(&self) -> Option<serde_json::Value> {
        if self.body.trim().is_empty() {
            return None;
        }
        serde_json::from_str(&self.body).ok()
    }
}

/// A target together with the credentials used to call it.
#[derive(Debug, Clone)]
pub struct RemoteTarget {
    pub target: Target,
    pub credentials: Credentials,
}

impl RemoteTarget {
    pub fn id(&self) -> &str {
        &self.target.id
    }
}

/// Post summary returned by list queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePost {
    pub id: u64,
    pub slug: String,
    pub title: String,
    pub link: Option<String>,
}

/// Taxonomy term as seen on the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTerm {
    pub id: u64,
    pub name: String,
    pub slug: String,
    pub parent: Option<u64>,
}

/// Media summary returned by uploads and searches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMedia {
    pub id: u64,
    pub source_url: String,
    pub slug: String,
    pub title: String,
}

/// Filter for term list queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermQuery {
    Slug(String),
    Search(String),
}

/// Body of a term creation request.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TermPayload {
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Bytes and metadata of one media upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub title: Option<String>,
    pub alt_text: Option<String>,
}

/// Local asset bytes loaded by a [`MediaSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl MediaAsset {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// REST contract of a remote content API.
///
/// Implementations own transport concerns (pacing, backoff, timeouts); every
/// method returns the last error once retries are exhausted.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Cheap authenticated call verifying the target is reachable.
    async fn probe(&self, remote: &RemoteTarget) -> std::result::Result<(), SyncError>;

    async fn create_post(
        &self,
        remote: &RemoteTarget,
        payload: &PostPayload,
    ) -> std::result::Result<RawResponse, SyncError>;

    async fn update_post(
        &self,
        remote: &RemoteTarget,
        remote_id: u64,
        payload: &PostPayload,
    ) -> std::result::Result<RawResponse, SyncError>;

    async fn delete_post(
        &self,
        remote: &RemoteTarget,
        remote_id: u64,
    ) -> std::result::Result<(), SyncError>;

    /// Posts with exactly this slug, most recent first.
    async fn find_posts_by_slug(
        &self,
        remote: &RemoteTarget,
        slug: &str,
    ) -> std::result::Result<Vec<RemotePost>, SyncError>;

    /// Full-text post search.
    async fn search_posts(
        &self,
        remote: &RemoteTarget,
        query: &str,
    ) -> std::result::Result<Vec<RemotePost>, SyncError>;

    async fn find_terms(
        &self,
        remote: &RemoteTarget,
        kind: TaxonomyKind,
        query: &TermQuery,
    ) -> std::result::Result<Vec<RemoteTerm>, SyncError>;

    async fn create_term(
        &self,
        remote: &RemoteTarget,
        kind: TaxonomyKind,
        payload: &TermPayload,
    ) -> std::result::Result<RemoteTerm, SyncError>;

    async fn upload_media(
        &self,
        remote: &RemoteTarget,
        upload: &MediaUpload,
    ) -> std::result::Result<RawResponse, SyncError>;

    async fn search_media(
        &self,
        remote: &RemoteTarget,
        query: &str,
    ) -> std::result::Result<Vec<RemoteMedia>, SyncError>;
}

/// Durable per-(target, item) sync state.
#[async_trait]
pub trait SyncLedger: Send + Sync {
    /// Insert a pending record or reset the existing one to pending.
    ///
    /// The retry count survives the reset; there is never more than one row
    /// per pair.
    async fn create_or_reset(
        &self,
        target_id: &str,
        item_id: u64,
        kind: SyncKind,
        scheduled_at: Option<i64>,
    ) -> Result<SyncRecord>;

    /// Move a record to `status`.
    ///
    /// `failed` increments the retry count; `success` clears the error and
    /// stamps `synced_at`. Transitions outside the state machine are rejected.
    async fn transition(
        &self,
        target_id: &str,
        item_id: u64,
        status: SyncStatus,
        remote_id: Option<u64>,
        error: Option<&str>,
    ) -> Result<SyncRecord>;

    async fn get(&self, target_id: &str, item_id: u64) -> Result<Option<SyncRecord>>;

    async fn get_remote_id(&self, target_id: &str, item_id: u64) -> Result<Option<u64>>;

    /// Reset failed records below `max_retries` attempts to pending.
    async fn retry_failed(&self, target_id: &str, max_retries: u32) -> Result<u64>;

    async fn list_for_target(
        &self,
        target_id: &str,
        status: Option<SyncStatus>,
    ) -> Result<Vec<SyncRecord>>;

    /// Fail records stuck in `syncing` since before `older_than`.
    async fn sweep_stuck(&self, older_than: i64) -> Result<u64>;

    async fn stats(&self, target_id: Option<&str>) -> Result<SyncStats>;
}

/// Durable per-(target, media) upload state.
#[async_trait]
pub trait MediaLedger: Send + Sync {
    async fn get(&self, target_id: &str, media_id: u64) -> Result<Option<MediaSyncRecord>>;

    /// Insert a pending record or reset an unfinished one to pending.
    async fn begin(&self, target_id: &str, media: &MediaRef) -> Result<MediaSyncRecord>;

    async fn transition(
        &self,
        target_id: &str,
        media_id: u64,
        status: MediaSyncStatus,
        remote: Option<(u64, String)>,
        error: Option<&str>,
    ) -> Result<MediaSyncRecord>;

    async fn retry_failed(&self, target_id: &str, max_retries: u32) -> Result<u64>;

    /// Fail records stuck in `uploading` since before `older_than`.
    async fn sweep_stuck(&self, older_than: i64) -> Result<u64>;

    /// Delete successful records synced before `older_than`.
    async fn purge_succeeded(&self, older_than: i64) -> Result<u64>;
}

/// Local term to remote term correspondence.
#[async_trait]
pub trait TermMappingStore: Send + Sync {
    async fn get(
        &self,
        target_id: &str,
        kind: TaxonomyKind,
        local_id: u64,
    ) -> Result<Option<TermMapping>>;

    async fn save(&self, mapping: &TermMapping) -> Result<()>;

    async fn remove_for_target(&self, target_id: &str) -> Result<u64>;
}

/// Target administration.
#[async_trait]
pub trait TargetRepository: Send + Sync {
    async fn save(&self, target: &Target) -> Result<()>;

    async fn get(&self, target_id: &str) -> Result<Option<Target>>;

    async fn list(&self, active_only: bool) -> Result<Vec<Target>>;

    /// Mark inactive; ledger rows are retained.
    async fn deactivate(&self, target_id: &str) -> Result<()>;

    /// Remove the target and every row referencing it.
    async fn delete(&self, target_id: &str) -> Result<()>;
}

/// Per-target secret storage.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn secret(&self, target_id: &str) -> Result<Option<String>>;

    async fn store(&self, target_id: &str, secret: &str) -> Result<()>;

    async fn remove(&self, target_id: &str) -> Result<()>;
}

/// Read-only access to local content.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Snapshot of an item; `NotFound` when it does not exist.
    async fn get_item(&self, item_id: u64) -> Result<ContentItem>;

    /// A local term, used to walk parent chains.
    async fn get_term(&self, kind: TaxonomyKind, term_id: u64) -> Result<Option<TermRef>>;
}

/// Loads local media bytes.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn load(&self, media: &MediaRef) -> Result<MediaAsset>;
}

/// Shrinks assets before upload.
#[async_trait]
pub trait AssetOptimizer: Send + Sync {
    async fn optimize(&self, asset: MediaAsset) -> std::result::Result<MediaAsset, SyncError>;
}

/// Durable queue of deferred task descriptors.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Queue `task` and return the id of the pending task for its
    /// (item, target) pair: `task.id`, or the one already waiting.
    async fn enqueue(&self, task: &SyncTask) -> Result<String>;

    /// Claim up to `limit` pending tasks due at `now`, marking them running.
    async fn due(&self, limit: usize, now: i64) -> Result<Vec<SyncTask>>;

    async fn complete(&self, task_id: &str) -> Result<()>;

    async fn fail(&self, task_id: &str, error: &str) -> Result<()>;

    /// Return running tasks claimed before `claimed_before` to pending.
    async fn requeue_stale(&self, claimed_before: i64) -> Result<u64>;
}

/// Key-value view over application settings.
pub trait SettingsStore: Send + Sync {
    fn settings(&self) -> Settings;

    /// Dotted-key read, e.g. `api_settings.timeout`.
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.settings().lookup(key)
    }
}

/// Fixed settings, for tests and one-shot commands.
impl SettingsStore for Settings {
    fn settings(&self) -> Settings {
        self.clone()
    }
}
