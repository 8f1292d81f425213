//! Delay policy between download attempts.
//!
//! The delay before retry `n` is `base * 2^n` plus up to half of that again
//! as random jitter, never more than `max`.

use std::time::Duration;

use rand::Rng;

use packsync_core::RuntimeConfig;

/// Exponential backoff between transfer attempts, capped and jittered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            base: Duration::from_millis(config.download.backoff_base_ms),
            max: Duration::from_millis(config.download.backoff_max_ms),
        }
    }

    /// No delay at all between attempts.
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// `min(base * 2^retry, max)`; `retry` is 0 for the first retry.
    pub fn delay(&self, retry: u32) -> Duration {
        let multiplier = 2_u32.saturating_pow(retry);
        self.base.saturating_mul(multiplier).min(self.max)
    }

    /// [`Backoff::delay`] plus up to 50% random jitter, still capped at `max`.
    pub fn jittered(&self, retry: u32) -> Duration {
        let delay = self.delay(retry);
        let spread = delay.as_millis() as u64 / 2;
        if spread == 0 {
            return delay;
        }
        let extra = rand::rng().random_range(0..=spread);
        (delay + Duration::from_millis(extra)).min(self.max)
    }
}
