use std::env;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Throttling applied while assembling a multi-card set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyPacing {
    /// Pause before every distractor request except the first.
    pub distractor_gap: Duration,
    /// Pause before the one manual retry of a failed distractor.
    pub distractor_retry_pause: Duration,
}

impl Default for AssemblyPacing {
    fn default() -> Self {
        Self {
            distractor_gap: Duration::from_millis(500),
            distractor_retry_pause: Duration::from_millis(1000),
        }
    }
}

/// Delay before a background refill, per slot and per serve path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefillDelays {
    pub single_after_serve: Duration,
    pub single_after_cold: Duration,
    pub multi_after_serve: Duration,
    pub multi_after_cold: Duration,
}

impl Default for RefillDelays {
    fn default() -> Self {
        Self {
            single_after_serve: Duration::from_millis(3000),
            single_after_cold: Duration::from_millis(5000),
            multi_after_serve: Duration::from_millis(4000),
            multi_after_cold: Duration::from_millis(6000),
        }
    }
}

impl RefillDelays {
    /// Every delay multiplied by `percent / 100`.
    pub fn scaled(&self, percent: u32) -> Self {
        let scale = |delay: Duration| delay * percent / 100;
        Self {
            single_after_serve: scale(self.single_after_serve),
            single_after_cold: scale(self.single_after_cold),
            multi_after_serve: scale(self.multi_after_serve),
            multi_after_cold: scale(self.multi_after_cold),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    pub pacing: AssemblyPacing,
    pub refill: RefillDelays,
}

impl EngineConfig {
    /// Defaults overridden by `SPOTDIFF_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read_u64 = |key: &str, min: u64, max: u64| {
            lookup(key)
                .and_then(|raw| raw.trim().parse::<u64>().ok())
                .map(|value| value.clamp(min, max))
        };
        let mut config = Self::default();
        if let Some(retries) = read_u64("SPOTDIFF_RETRY_ATTEMPTS", 0, 6) {
            config.retry.retries = retries as u32;
        }
        if let Some(ms) = read_u64("SPOTDIFF_RETRY_BACKOFF_MS", 50, 60_000) {
            config.retry.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = read_u64("SPOTDIFF_DISTRACTOR_GAP_MS", 0, 10_000) {
            config.pacing.distractor_gap = Duration::from_millis(ms);
        }
        if let Some(ms) = read_u64("SPOTDIFF_DISTRACTOR_RETRY_MS", 0, 30_000) {
            config.pacing.distractor_retry_pause = Duration::from_millis(ms);
        }
        if let Some(percent) = read_u64("SPOTDIFF_REFILL_SCALE", 0, 1000) {
            config.refill = config.refill.scaled(percent as u32);
        }
        config
    }
}
