//! Configuration structures
//!
//! `Settings` mirrors the option store the engine reads from. Every section
//! has defaults, so a partial config file is valid.

use serde::{Deserialize, Serialize};

use crate::constants::{MEDIA_SUCCESS_TTL_SECS, STUCK_RECORD_TIMEOUT_SECS};
use crate::types::DispatchMode;

/// Top-level application settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_settings: ApiSettings,
    pub sync_settings: SyncSettings,
    pub image_settings: ImageSettings,
    pub database: DatabaseSettings,
    pub content: ContentSettings,
    pub sweeper: SweeperSettings,
}

/// Outbound API behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Timeout for non-upload calls, in seconds.
    pub timeout: u64,
    /// Maximum attempts per HTTP call (initial try included).
    pub retries: u32,
    /// Deferred tasks processed per worker tick.
    pub batch_size: usize,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self { timeout: 30, retries: 5, batch_size: 10 }
    }
}

/// Dispatch selection and pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub parallel_sync: bool,
    pub async_sync: bool,
    /// Enables the minimum spacing between calls to the same host.
    pub rate_limit: bool,
    /// Delay applied to deferred tasks before they become due.
    pub deferred_delay_secs: u64,
    /// Poll interval of the deferred worker.
    pub worker_poll_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            parallel_sync: false,
            async_sync: false,
            rate_limit: true,
            deferred_delay_secs: 0,
            worker_poll_secs: 30,
        }
    }
}

/// Media upload limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    /// Largest upload accepted without re-encoding, in megabytes.
    pub max_image_size: u64,
    /// JPEG quality used when re-encoding oversized images (1-100).
    pub image_quality: u8,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self { max_image_size: 5, image_quality: 85 }
    }
}

impl ImageSettings {
    pub fn max_image_bytes(&self) -> u64 {
        self.max_image_size.saturating_mul(1024 * 1024)
    }
}

/// Local ledger storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { path: "relaypost.db".into(), pool_size: 4 }
    }
}

/// Location of local content snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentSettings {
    pub root: String,
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self { root: "content".into() }
    }
}

/// Ledger maintenance schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperSettings {
    pub cron_expression: String,
    pub stuck_after_secs: i64,
    pub media_success_ttl_secs: i64,
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            cron_expression: "0 */5 * * * *".into(),
            stuck_after_secs: STUCK_RECORD_TIMEOUT_SECS,
            media_success_ttl_secs: MEDIA_SUCCESS_TTL_SECS,
        }
    }
}

impl Settings {
    /// Dispatch mode implied by configuration. `async_sync` wins over
    /// `parallel_sync`.
    pub fn dispatch_mode(&self) -> DispatchMode {
        if self.sync_settings.async_sync {
            DispatchMode::Deferred
        } else if self.sync_settings.parallel_sync {
            DispatchMode::Parallel
        } else {
            DispatchMode::Serial
        }
    }

    /// Read a setting by dotted key, e.g. `api_settings.timeout`.
    pub fn lookup(&self, key: &str) -> Option<serde_json::Value> {
        let mut current = serde_json::to_value(self).ok()?;
        for segment in key.split('.') {
            current = current.get_mut(segment)?.take();
        }
        Some(current)
    }
}
