//! Per-host rate-limit cooperation and pacing.
//!
//! A single [`HostRateLimiter`] is shared by every outbound call in the
//! process. It tracks two things per host:
//!
//! - the reset instant of the most recent 429 window, so unrelated calls to
//!   the same host wait the window out before dispatching;
//! - the instant of the most recent dispatch, so consecutive calls are spaced
//!   by at least `min_spacing`.
//!
//! Both maps are read and written through `DashMap` shards. Concurrent
//! callers may occasionally over-wait by one spacing interval; they never
//! dispatch inside an open window.
//!
//! Time comes from `tokio::time::Instant`, so tests can drive it with a
//! paused clock.

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use super::constants::{DEFAULT_HOST_SPACING, MAX_RETRY_AFTER, MIN_RETRY_AFTER};

/// Clamp a server-provided retry hint to the accepted range.
pub fn clamp_retry_after(hint: Duration) -> Duration {
    hint.clamp(MIN_RETRY_AFTER, MAX_RETRY_AFTER)
}

/// Process-wide registry of per-host reset windows and dispatch times.
#[derive(Debug)]
pub struct HostRateLimiter {
    windows: DashMap<String, Instant>,
    last_dispatch: DashMap<String, Instant>,
    min_spacing: Option<Duration>,
}

impl Default for HostRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_HOST_SPACING)
    }
}

impl HostRateLimiter {
    /// Limiter enforcing `min_spacing` between calls to the same host.
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            last_dispatch: DashMap::new(),
            min_spacing: (!min_spacing.is_zero()).then_some(min_spacing),
        }
    }

    /// Limiter that only honours 429 windows.
    pub fn without_pacing() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Limiter with pacing toggled by configuration.
    pub fn with_pacing(enabled: bool) -> Self {
        if enabled {
            Self::default()
        } else {
            Self::without_pacing()
        }
    }

    /// Open (or extend) a reset window for `host` lasting `wait`.
    ///
    /// A shorter window never truncates one that is already open.
    pub fn record_rate_limit(&self, host: &str, wait: Duration) -> Instant {
        let reset = Instant::now() + wait;
        let stored = match self.windows.entry(host.to_string()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() < reset {
                    entry.insert(reset);
                }
                *entry.get()
            }
            Entry::Vacant(entry) => *entry.insert(reset),
        };
        debug!(host, wait_ms = wait.as_millis() as u64, "recorded rate-limit window");
        stored
    }

    /// Remaining time before `host` may be called, if a window is open.
    pub fn blocked_for(&self, host: &str) -> Option<Duration> {
        let reset = self.window_end(host)?;
        let now = Instant::now();
        (reset > now).then(|| reset - now)
    }

    /// Wait until a call to `host` may be dispatched and claim the slot.
    ///
    /// Returns the total time spent waiting.
    pub async fn acquire(&self, host: &str) -> Duration {
        let started = Instant::now();
        loop {
            let slot = self.reserve_slot(host);
            if slot > Instant::now() {
                debug!(
                    host,
                    wait_ms = (slot - Instant::now()).as_millis() as u64,
                    "waiting for host slot"
                );
                tokio::time::sleep_until(slot).await;
            }

            // A 429 seen by another caller while we slept re-opens the window.
            match self.window_end(host) {
                Some(reset) if reset > Instant::now() => continue,
                _ => return started.elapsed(),
            }
        }
    }

    /// Forget all state for `host`.
    pub fn reset(&self, host: &str) {
        self.windows.remove(host);
        self.last_dispatch.remove(host);
    }

    fn window_end(&self, host: &str) -> Option<Instant> {
        self.windows.get(host).map(|reset| *reset)
    }

    fn reserve_slot(&self, host: &str) -> Instant {
        let now = Instant::now();
        let mut slot = self.window_end(host).filter(|reset| *reset > now).unwrap_or(now);

        let Some(spacing) = self.min_spacing else {
            return slot;
        };

        match self.last_dispatch.entry(host.to_string()) {
            Entry::Occupied(mut entry) => {
                let earliest = *entry.get() + spacing;
                if earliest > slot {
                    slot = earliest;
                }
                entry.insert(slot);
            }
            Entry::Vacant(entry) => {
                entry.insert(slot);
            }
        }
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_is_clamped() {
        assert_eq!(clamp_retry_after(Duration::ZERO), Duration::from_secs(1));
        assert_eq!(clamp_retry_after(Duration::from_secs(5)), Duration::from_secs(5));
        assert_eq!(clamp_retry_after(Duration::from_secs(3600)), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn first_call_does_not_wait() {
        let limiter = HostRateLimiter::default();
        assert_eq!(limiter.acquire("a.example").await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_calls_are_spaced() {
        let limiter = HostRateLimiter::default();
        limiter.acquire("a.example").await;
        let waited = limiter.acquire("a.example").await;
        assert!(waited >= Duration::from_secs(1), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn hosts_are_paced_independently() {
        let limiter = HostRateLimiter::default();
        limiter.acquire("a.example").await;
        assert_eq!(limiter.acquire("b.example").await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_can_be_disabled() {
        let limiter = HostRateLimiter::without_pacing();
        limiter.acquire("a.example").await;
        assert_eq!(limiter.acquire("a.example").await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn shorter_window_does_not_truncate_open_one() {
        let limiter = HostRateLimiter::without_pacing();
        limiter.record_rate_limit("a.example", Duration::from_secs(10));
        limiter.record_rate_limit("a.example", Duration::from_secs(2));
        let remaining = limiter.blocked_for("a.example").unwrap();
        assert!(remaining > Duration::from_secs(9));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_window() {
        let limiter = HostRateLimiter::default();
        limiter.record_rate_limit("a.example", Duration::from_secs(30));
        limiter.reset("a.example");
        assert!(limiter.blocked_for("a.example").is_none());
        assert_eq!(limiter.acquire("a.example").await, Duration::ZERO);
    }
}
