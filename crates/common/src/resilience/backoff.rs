// Exponential backoff with bounded jitter
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use super::constants::{
    DEFAULT_JITTER_FACTOR, DEFAULT_MAX_DELAY, MAX_BACKOFF_EXPONENT, MEDIA_BASE_DELAY,
    MEDIA_MAX_DELAY, POST_BASE_DELAY, SERVER_ERROR_MULTIPLIER,
};

/// Invalid backoff parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackoffError {
    #[error("base_delay ({base:?}) cannot be greater than max_delay ({max:?})")]
    BaseExceedsCap { base: Duration, max: Duration },
}

/// Delay schedule for retried calls.
///
/// Attempt `k` (0-indexed) waits `min(base * 2^k * multiplier, cap)`, where
/// the multiplier is 2 after a server error and 1 otherwise, then the result
/// is moved by up to `jitter_factor` in either direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    base_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::posts()
    }
}

impl BackoffPolicy {
    /// Create a policy, rejecting a base delay above the cap.
    pub fn new(base_delay: Duration, max_delay: Duration) -> Result<Self, BackoffError> {
        if base_delay > max_delay {
            return Err(BackoffError::BaseExceedsCap { base: base_delay, max: max_delay });
        }
        Ok(Self { base_delay, max_delay, jitter_factor: DEFAULT_JITTER_FACTOR })
    }

    /// 3s base, 60s cap.
    pub fn posts() -> Self {
        Self {
            base_delay: POST_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }

    /// 10s base, 300s cap.
    pub fn media() -> Self {
        Self {
            base_delay: MEDIA_BASE_DELAY,
            max_delay: MEDIA_MAX_DELAY,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }

    /// Set the jitter factor (0.0 = none, clamped to 1.0).
    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry `attempt`, without jitter.
    pub fn unjittered_delay(&self, attempt: u32, server_error: bool) -> Duration {
        let base_millis = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max_millis = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);

        let exponent = attempt.min(MAX_BACKOFF_EXPONENT);
        let mut multiplier = 2_u64.saturating_pow(exponent);
        if server_error {
            multiplier = multiplier.saturating_mul(u64::from(SERVER_ERROR_MULTIPLIER));
        }

        Duration::from_millis(base_millis.saturating_mul(multiplier).min(max_millis))
    }

    /// Delay before retry `attempt`, with jitter applied.
    pub fn delay(&self, attempt: u32, server_error: bool) -> Duration {
        self.apply_jitter(self.unjittered_delay(attempt, server_error))
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_factor == 0.0 || delay.is_zero() {
            return delay;
        }

        let factor = rand::thread_rng().gen_range(-self.jitter_factor..=self.jitter_factor);
        delay.mul_f64((1.0 + factor).max(0.0))
    }
}
