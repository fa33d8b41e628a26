use rand::Rng;
use std::time::Duration;

use crate::config::SchedulerConfig;

/// Capped exponential delay between retries of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self { base, max, jitter }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.backoff_max_ms),
            config.jitter,
        )
    }

    /// Delay before retry number `attempt` (0 = first retry)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        let capped = base_ms.saturating_mul(1u64 << attempt.min(16)).min(max_ms);

        // full jitter: anywhere between zero and the cap
        let delay_ms = if self.jitter && capped > 0 {
            rng.gen_range(0..=capped)
        } else {
            capped
        };
        Duration::from_millis(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn config(jitter: bool) -> SchedulerConfig {
        SchedulerConfig {
            jitter,
            ..SchedulerConfig::default()
        }
    }

    #[test]
    fn test_default_config_schedule() {
        let backoff = Backoff::from_config(&config(false));

        let delays: Vec<u64> = (0..8)
            .map(|attempt| backoff.delay(attempt).as_millis() as u64)
            .collect();
        assert_eq!(
            delays,
            vec![1_000, 2_000, 4_000, 8_000, 16_000, 32_000, 60_000, 60_000]
        );
    }

    #[test]
    fn test_configured_jitter_stays_under_each_cap() {
        let backoff = Backoff::from_config(&config(true));
        let exact = Backoff::from_config(&config(false));
        let mut rng = StdRng::seed_from_u64(42);

        let mut below_cap = 0;
        for attempt in 0..10 {
            let delay = backoff.delay_with_rng(attempt, &mut rng);
            assert!(delay <= exact.delay(attempt), "attempt {attempt}");
            if delay < exact.delay(attempt) {
                below_cap += 1;
            }
        }
        assert!(below_cap > 0);
    }

    #[test]
    fn test_zero_base_never_waits() {
        let config = SchedulerConfig {
            backoff_base_ms: 0,
            ..SchedulerConfig::default()
        };
        let backoff = Backoff::from_config(&config);
        assert_eq!(backoff.delay(5), Duration::ZERO);
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), false);
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(60));
    }
}
