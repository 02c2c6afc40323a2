use rand::Rng;
use std::time::Duration;

/// Ceiling on any retry delay, jitter included.
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Exponential backoff with up to 50% positive jitter.
///
/// `max_retries` caps the exponent, not the number of attempts: once the
/// cap is reached every further failure waits about the same time, and the
/// poll loop keeps retrying until it is cancelled.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_secs: f64,
    max_retries: u32,
    consecutive_errors: u32,
}

impl Backoff {
    pub fn new(base_backoff: Duration, max_retries: u32) -> Self {
        Self {
            base_secs: base_backoff.as_secs_f64(),
            max_retries,
            consecutive_errors: 0,
        }
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Counts a failed cycle and returns how long to wait before the next one.
    pub fn record_failure(&mut self) -> Duration {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        let base = self.base_delay_secs();
        let jitter = rand::thread_rng().gen::<f64>() * 0.5 * base;
        Duration::from_secs_f64((base + jitter).min(MAX_BACKOFF.as_secs_f64()))
    }

    /// Called after any cycle that completed without a fetch or parse failure.
    pub fn reset(&mut self) {
        self.consecutive_errors = 0;
    }

    /// Delay before jitter for the current error count: `base * 2^(exp - 1)`
    /// with `exp = min(errors, max_retries)`.
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs_f64(self.base_delay_secs().min(MAX_BACKOFF.as_secs_f64()))
    }

    fn base_delay_secs(&self) -> f64 {
        let exp = self.consecutive_errors.min(self.max_retries) as i32;
        self.base_secs * 2f64.powi(exp - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_doubles_per_failure() {
        let mut backoff = Backoff::new(Duration::from_secs(2), 5);
        let expected = [2, 4, 8, 16, 32];
        for secs in expected {
            let wait = backoff.record_failure();
            assert_eq!(backoff.base_delay(), Duration::from_secs(secs));
            assert!(wait >= Duration::from_secs(secs));
            assert!(wait.as_secs_f64() <= secs as f64 * 1.5);
        }
        assert_eq!(backoff.consecutive_errors(), 5);
    }

    #[test]
    fn test_exponent_capped_but_retries_continue() {
        let mut backoff = Backoff::new(Duration::from_secs(2), 3);
        for _ in 0..20 {
            backoff.record_failure();
        }
        assert_eq!(backoff.consecutive_errors(), 20);
        assert_eq!(backoff.base_delay(), Duration::from_secs(8));
    }

    #[test]
    fn test_never_exceeds_ceiling() {
        let mut backoff = Backoff::new(Duration::from_secs(60), 10);
        for _ in 0..10 {
            assert!(backoff.record_failure() <= MAX_BACKOFF);
        }
        assert_eq!(backoff.base_delay(), MAX_BACKOFF);
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::new(Duration::from_secs(2), 5);
        backoff.record_failure();
        backoff.record_failure();
        backoff.reset();
        assert_eq!(backoff.consecutive_errors(), 0);
        backoff.record_failure();
        assert_eq!(backoff.base_delay(), Duration::from_secs(2));
    }

    proptest! {
        #[test]
        fn delay_within_jitter_band(base in 1u64..120, max_retries in 1u32..12, failures in 1usize..40) {
            let mut backoff = Backoff::new(Duration::from_secs(base), max_retries);
            let mut previous_base = Duration::ZERO;
            for _ in 0..failures {
                let wait = backoff.record_failure();
                let floor = backoff.base_delay();

                prop_assert!(wait <= MAX_BACKOFF);
                prop_assert!(wait >= floor);
                prop_assert!(wait.as_secs_f64() <= floor.as_secs_f64() * 1.5 + 1e-9);
                prop_assert!(floor >= previous_base);
                previous_base = floor;
            }
        }
    }
}
