//! Exponential backoff with jitter

use rand::Rng;
use std::time::Duration;
use weft_core::SyncConfig;

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, capped at
/// `max`, then scaled by a random factor in `[1 - jitter, 1 + jitter]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max,
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.backoff_base, config.backoff_max, config.jitter)
    }

    /// Delay without jitter
    pub fn nominal(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let nominal = self.nominal(attempt);
        if self.jitter <= 0.0 {
            return nominal;
        }
        let factor = rand::rng().random_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        nominal.mul_f64(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let backoff = Backoff::new(Duration::from_millis(250), Duration::from_secs(30), 0.0);
        assert_eq!(backoff.nominal(1), Duration::from_millis(250));
        assert_eq!(backoff.nominal(2), Duration::from_millis(500));
        assert_eq!(backoff.nominal(3), Duration::from_secs(1));
        assert_eq!(backoff.nominal(8), Duration::from_secs(30));
        assert_eq!(backoff.nominal(200), Duration::from_secs(30));
        assert_eq!(backoff.delay(2), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_in_band() {
        let backoff = Backoff::from_config(&SyncConfig::default());
        for _ in 0..100 {
            let delay = backoff.delay(3);
            assert!(delay >= Duration::from_millis(799), "{delay:?}");
            assert!(delay <= Duration::from_millis(1201), "{delay:?}");
        }
    }
}
