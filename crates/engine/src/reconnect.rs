//! Jittered exponential back-off for establishing the chat socket.

use std::time::Duration;

use lc_domain::config::ReconnectConfig;

/// Delay schedule between connection attempts.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    pub initial_delay: Duration,
    /// Cap applied before jitter.
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Total attempts allowed.  `0` behaves like `1`.
    pub max_attempts: u32,
    /// Mixed into the jitter so visitors do not share one schedule.
    pub jitter_seed: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

impl ReconnectBackoff {
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_factor: config.backoff_factor,
            max_attempts: config.max_attempts,
            jitter_seed: 0,
        }
    }

    /// Seed the jitter from a visitor id.
    pub fn seeded_for(mut self, visitor_id: &str) -> Self {
        // FNV-1a
        self.jitter_seed = visitor_id.bytes().fold(0x811c_9dc5_u32, |hash, b| {
            (hash ^ u32::from(b)).wrapping_mul(0x0100_0193)
        });
        self
    }

    /// Delay to wait after the given number of failed attempts (0-indexed).
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let exponent = i32::try_from(failures).unwrap_or(i32::MAX);
        let delay_ms = base_ms * self.backoff_factor.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        // Up to 25% extra so many visitors dropped together do not return
        // in lockstep.
        let jitter = capped_ms * 0.25 * spread(self.jitter_seed, failures);
        Duration::from_millis((capped_ms + jitter) as u64)
    }

    /// Whether `attempts_made` attempts have used up the budget.
    pub fn should_give_up(&self, attempts_made: u32) -> bool {
        attempts_made >= self.max_attempts.max(1)
    }
}

/// Deterministic value in `[0, 1)` derived from the seed and attempt number.
fn spread(seed: u32, failures: u32) -> f64 {
    let hash = seed
        .wrapping_add(failures)
        .wrapping_add(1)
        .wrapping_mul(2_654_435_761);
    f64::from(hash) / (f64::from(u32::MAX) + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_from_config() {
        let b = ReconnectBackoff::from_config(&ReconnectConfig {
            initial_delay_ms: 250,
            max_delay_ms: 4_000,
            backoff_factor: 3.0,
            max_attempts: 5,
        });
        assert_eq!(b.initial_delay, Duration::from_millis(250));
        assert_eq!(b.max_delay, Duration::from_secs(4));
        assert_eq!(b.max_attempts, 5);
    }

    #[test]
    fn delays_grow_until_capped() {
        let b = ReconnectBackoff {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            backoff_factor: 2.0,
            max_attempts: 10,
            jitter_seed: 0,
        };
        assert!(b.delay_for_attempt(1) > b.delay_for_attempt(0));
        assert!(b.delay_for_attempt(2) > b.delay_for_attempt(1));
        // Cap plus at most 25% jitter.
        assert!(b.delay_for_attempt(30) <= Duration::from_millis(1_250));
        assert!(b.delay_for_attempt(u32::MAX) <= Duration::from_millis(1_250));
    }

    #[test]
    fn jitter_differs_between_visitors() {
        let base = ReconnectBackoff {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            backoff_factor: 2.0,
            max_attempts: 10,
            jitter_seed: 0,
        };
        let other = ReconnectBackoff {
            jitter_seed: 1,
            ..base.clone()
        };
        assert_ne!(base.delay_for_attempt(0), other.delay_for_attempt(0));

        let a = base.clone().seeded_for("visitor-a");
        let again = base.clone().seeded_for("visitor-a");
        let b = base.seeded_for("visitor-b");
        assert_eq!(a.jitter_seed, again.jitter_seed);
        assert_ne!(a.jitter_seed, b.jitter_seed);
    }

    #[test]
    fn zero_attempts_still_allows_one() {
        let b = ReconnectBackoff {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(!b.should_give_up(0));
        assert!(b.should_give_up(1));
    }

    #[test]
    fn gives_up_after_budget() {
        let b = ReconnectBackoff::default();
        assert_eq!(b.max_attempts, 3);
        assert!(!b.should_give_up(2));
        assert!(b.should_give_up(3));
    }
}
