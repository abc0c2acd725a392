//! Per-call retry and timeout policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use relaypost_common::resilience::constants::DEFAULT_MAX_ATTEMPTS;
use relaypost_common::BackoffPolicy;
use relaypost_domain::ApiSettings;

const UPLOAD_BASE_TIMEOUT_SECS: u64 = 60;
const UPLOAD_SECS_PER_MB: u64 = 30;
const UPLOAD_MAX_TIMEOUT_SECS: u64 = 300;
const BYTES_PER_MB: u64 = 1024 * 1024;

/// How a single logical call is attempted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestPolicy {
    /// Attempts including the first one.
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    /// Use the server's `Retry-After` hint on 429 instead of the backoff
    /// schedule.
    pub honor_retry_after: bool,
    pub timeout: Duration,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffPolicy::posts(),
            honor_retry_after: true,
            timeout: Duration::from_secs(30),
        }
    }
}

impl RequestPolicy {
    /// Posts, terms and lookups: 3s base delay, 60s cap.
    pub fn posts(max_attempts: u32, timeout: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), timeout, ..Self::default() }
    }

    /// Uploads: 10s base delay, 300s cap, timeout sized to the payload.
    pub fn media(max_attempts: u32, upload_bytes: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: BackoffPolicy::media(),
            honor_retry_after: true,
            timeout: upload_timeout(upload_bytes),
        }
    }

    pub fn from_settings(api: &ApiSettings) -> Self {
        Self::posts(api.retries, Duration::from_secs(api.timeout.max(1)))
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// `60 + 30 * MB` seconds, capped at 300. Partial megabytes count as whole
/// ones.
pub fn upload_timeout(bytes: u64) -> Duration {
    let megabytes = bytes.div_ceil(BYTES_PER_MB);
    let secs = UPLOAD_BASE_TIMEOUT_SECS.saturating_add(megabytes.saturating_mul(UPLOAD_SECS_PER_MB));
    Duration::from_secs(secs.min(UPLOAD_MAX_TIMEOUT_SECS))
}

/// Parse a `Retry-After` value: delta seconds or an HTTP date.
///
/// Dates in the past yield zero; the caller clamps.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
