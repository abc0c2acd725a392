//! Durable sync-state records.

use serde::{Deserialize, Serialize};

use super::content::TaxonomyKind;
use crate::constants::{STUCK_SYNC_MARKER, STUCK_UPLOAD_MARKER};

/// Lifecycle of one content item on one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Syncing,
    Success,
    Failed,
}

crate::impl_domain_status_conversions!(SyncStatus {
    Pending => "pending",
    Syncing => "syncing",
    Success => "success",
    Failed => "failed",
});

impl SyncStatus {
    /// Transitions accepted by the ledger's `transition` operation.
    ///
    /// `success -> pending` is deliberately absent; it only happens through
    /// an explicit reset.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Syncing | Self::Failed)
                | (Self::Syncing, Self::Success | Self::Failed)
                | (Self::Failed, Self::Pending)
        )
    }
}

/// Kind of remote mutation a sync performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    Create,
    Update,
    Delete,
}

crate::impl_domain_status_conversions!(SyncKind {
    Create => "create",
    Update => "update",
    Delete => "delete",
});

/// One row per (target, item).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub id: i64,
    pub target_id: String,
    pub item_id: u64,
    pub remote_id: Option<u64>,
    pub status: SyncStatus,
    pub kind: SyncKind,
    pub scheduled_at: Option<i64>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub created_at: i64,
    /// Start of the current attempt; stamped again by every reset.
    pub started_at: i64,
    pub updated_at: i64,
    pub synced_at: Option<i64>,
}

impl SyncRecord {
    /// Whether the ledger may move this record to `next`.
    ///
    /// On top of the status machine, a record the stuck sweep failed may
    /// still take the success of the attempt it timed out: that attempt
    /// reached the remote and its id must not be lost.
    pub fn accepts(&self, next: SyncStatus) -> bool {
        self.status.can_transition_to(next)
            || (self.status == SyncStatus::Failed
                && next == SyncStatus::Success
                && self.last_error.as_deref() == Some(STUCK_SYNC_MARKER))
    }
}

/// Lifecycle of one media asset on one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaSyncStatus {
    Pending,
    Uploading,
    Success,
    Failed,
}

crate::impl_domain_status_conversions!(MediaSyncStatus {
    Pending => "pending",
    Uploading => "uploading",
    Success => "success",
    Failed => "failed",
});

impl MediaSyncStatus {
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Uploading | Self::Failed)
                | (Self::Uploading, Self::Success | Self::Failed)
                | (Self::Failed, Self::Pending)
        )
    }
}

impl MediaSyncRecord {
    /// Same rule as [`SyncRecord::accepts`] for uploads timed out by the sweep.
    pub fn accepts(&self, next: MediaSyncStatus) -> bool {
        self.status.can_transition_to(next)
            || (self.status == MediaSyncStatus::Failed
                && next == MediaSyncStatus::Success
                && self.last_error.as_deref() == Some(STUCK_UPLOAD_MARKER))
    }
}

/// One row per (target, local media).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSyncRecord {
    pub id: i64,
    pub target_id: String,
    pub media_id: u64,
    pub local_url: String,
    pub remote_id: Option<u64>,
    pub remote_url: Option<String>,
    pub status: MediaSyncStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub synced_at: Option<i64>,
}

/// Local term to remote term correspondence on one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermMapping {
    pub target_id: String,
    pub taxonomy: TaxonomyKind,
    pub local_id: u64,
    pub remote_id: u64,
    pub slug: String,
    pub remote_parent: Option<u64>,
    pub updated_at: i64,
}

/// Derived read-only statistics over the ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    pub pending: u64,
    pub syncing: u64,
    pub success: u64,
    pub failed: u64,
    /// Mean seconds from the start of the latest attempt to its success.
    pub avg_seconds_to_success: Option<f64>,
}

impl SyncStats {
    pub fn total(&self) -> u64 {
        self.pending + self.syncing + self.success + self.failed
    }
}

/// State of a deferred task descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
}

crate::impl_domain_status_conversions!(TaskStatus {
    Pending => "pending",
    Running => "running",
    Done => "done",
    Failed => "failed",
});

/// Lightweight descriptor persisted for deferred dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTask {
    pub id: String,
    pub item_id: u64,
    pub target_id: String,
    pub kind: SyncKind,
    pub status: TaskStatus,
    pub run_at: i64,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: i64,
}
