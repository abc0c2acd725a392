//! Modular common utilities shared across RelayPost crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: backoff computation
//! - `runtime`: per-host rate-limit cooperation and pacing
//! - `platform`: pooled SQLite storage

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

#[cfg(feature = "foundation")]
pub mod resilience;
#[cfg(feature = "platform")]
pub mod storage;

#[cfg(feature = "foundation")]
pub use resilience::backoff::BackoffPolicy;
#[cfg(feature = "runtime")]
pub use resilience::host_limiter::HostRateLimiter;
