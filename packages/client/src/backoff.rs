//! Reconnect delay calculation.
//!
//! `delay = min(initial * decay^attempt, max)`, then perturbed by uniform
//! jitter in `[-jitter, +jitter]` of that delay and rounded to whole
//! milliseconds.

use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};

pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_DECAY: f64 = 1.5;
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);
pub const DEFAULT_JITTER: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    /// Growth factor per consecutive failure.
    pub decay: f64,
    pub max_delay: Duration,
    /// Jitter fraction in `[0, 1]`.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            decay: DEFAULT_DECAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: DEFAULT_JITTER,
        }
    }
}

/// Delay generator owning its random source.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    rng: StdRng,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            rng: StdRng::from_rng(&mut rand::rng()),
        }
    }

    /// Deterministic jitter for reproducible runs.
    pub fn with_seed(config: BackoffConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Capped delay in milliseconds before jitter.
    pub fn base_millis(&self, attempt: u32) -> f64 {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let initial = self.config.initial_delay.as_millis() as f64;
        let max = self.config.max_delay.as_millis() as f64;
        (initial * self.config.decay.powi(exponent)).min(max)
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay(&mut self, attempt: u32) -> Duration {
        let base = self.base_millis(attempt);
        let jitter = self.config.jitter.clamp(0.0, 1.0);
        let offset = if jitter > 0.0 {
            self.rng.random_range(-jitter..=jitter) * base
        } else {
            0.0
        };
        Duration::from_millis((base + offset).round().max(0.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_delay_grows_then_caps() {
        // テスト項目: 基準遅延は decay 倍で増加し、max で頭打ちになる
        let backoff = Backoff::with_seed(BackoffConfig::default(), 1);

        assert_eq!(backoff.base_millis(0), 1000.0);
        assert_eq!(backoff.base_millis(1), 1500.0);
        assert_eq!(backoff.base_millis(2), 2250.0);
        assert_eq!(backoff.base_millis(9), 30_000.0);
        assert_eq!(backoff.base_millis(u32::MAX), 30_000.0);
    }

    #[test]
    fn test_jittered_delay_stays_within_band() {
        // テスト項目: 試行 k の遅延は [b·d^k·(1−j), b·d^k·(1+j)]（max で上限）に収まる
        // given (前提条件):
        let mut backoff = Backoff::with_seed(BackoffConfig::default(), 42);

        for attempt in 0..12 {
            let base = backoff.base_millis(attempt);
            let low = (base * 0.8).floor() as u128;
            let high = (base * 1.2).ceil() as u128;
            for _ in 0..200 {
                // when (操作):
                let delay = backoff.delay(attempt).as_millis();

                // then (期待する結果):
                assert!(
                    (low..=high).contains(&delay),
                    "attempt {attempt}: {delay}ms outside {low}..={high}"
                );
            }
        }
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let config = BackoffConfig {
            jitter: 0.0,
            ..BackoffConfig::default()
        };
        let mut backoff = Backoff::with_seed(config, 7);

        assert_eq!(backoff.delay(0), Duration::from_millis(1000));
        assert_eq!(backoff.delay(3), Duration::from_millis(3375));
    }

    #[test]
    fn test_same_seed_same_delays() {
        let mut a = Backoff::with_seed(BackoffConfig::default(), 9);
        let mut b = Backoff::with_seed(BackoffConfig::default(), 9);
        let left: Vec<_> = (0..5).map(|k| a.delay(k)).collect();
        let right: Vec<_> = (0..5).map(|k| b.delay(k)).collect();
        assert_eq!(left, right);
    }
}
