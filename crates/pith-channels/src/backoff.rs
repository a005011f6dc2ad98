use std::time::Duration;

use rand::Rng;

const BASE: Duration = Duration::from_secs(1);
const CAP: Duration = Duration::from_secs(60);
const JITTER_FRACTION: f64 = 0.2;

/// Exponential backoff with a 1s base, a 60s cap, and ±20% jitter, per
/// the channel reconnect policy.
pub struct Backoff {
    attempt: u32,
}

impl Backoff {
    pub fn new() -> Self {
        Self { attempt: 0 }
    }

    /// Reset after a successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// The delay to wait before the next connect attempt, advancing the
    /// internal attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let exp = BASE.as_secs_f64() * 2f64.powi(self.attempt as i32);
        let capped = exp.min(CAP.as_secs_f64());
        self.attempt = self.attempt.saturating_add(1);

        let jitter = rand::thread_rng().gen_range((1.0 - JITTER_FRACTION)..=(1.0 + JITTER_FRACTION));
        Duration::from_secs_f64((capped * jitter).max(0.0))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_caps() {
        let mut backoff = Backoff::new();
        let first = backoff.next_delay();
        assert!(first.as_secs_f64() >= 0.8 && first.as_secs_f64() <= 1.2);

        let mut backoff = Backoff::new();
        for _ in 0..20 {
            let delay = backoff.next_delay();
            assert!(delay.as_secs_f64() <= CAP.as_secs_f64() * (1.0 + JITTER_FRACTION));
        }
    }

    #[test]
    fn reset_restarts_from_base() {
        let mut backoff = Backoff::new();
        for _ in 0..5 {
            backoff.next_delay();
        }
        backoff.reset();
        let delay = backoff.next_delay();
        assert!(delay.as_secs_f64() <= BASE.as_secs_f64() * (1.0 + JITTER_FRACTION));
    }
}
