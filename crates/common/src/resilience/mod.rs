//! Resilience primitives for outbound calls.
//!
//! - [`backoff`]: exponential backoff with bounded jitter
//! - [`host_limiter`]: process-wide per-host pacing and 429 reset windows

pub mod backoff;
pub mod constants;
#[cfg(feature = "runtime")]
pub mod host_limiter;

pub use backoff::BackoffPolicy;
#[cfg(feature = "runtime")]
pub use host_limiter::{clamp_retry_after, HostRateLimiter};
