//! Default retry and pacing parameters.

use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

pub const POST_BASE_DELAY: Duration = Duration::from_secs(3);
pub const MEDIA_BASE_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);
pub const MEDIA_MAX_DELAY: Duration = Duration::from_secs(300);

/// Fraction of the computed delay added or removed at random.
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;
pub const SERVER_ERROR_MULTIPLIER: u32 = 2;
pub const MAX_BACKOFF_EXPONENT: u32 = 16;

pub const MIN_RETRY_AFTER: Duration = Duration::from_secs(1);
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);
pub const DEFAULT_HOST_SPACING: Duration = Duration::from_secs(1);
