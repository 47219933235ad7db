//! Bounded, jittered exponential backoff between reconnection attempts.

use crate::models::ConnectionOptions;
use rand::Rng;
use std::time::Duration;

/// Tracks reconnection attempts and computes the delay before the next one.
///
/// The nominal delay for attempt `n` is `min(base * 2^n, max)`. A relative
/// jitter spreads clients that lost the same backend so they do not reconnect
/// in lockstep; the jittered value never exceeds `max`.
#[derive(Debug, Clone)]
pub(crate) struct ReconnectBackoff {
    base_ms: u64,
    max_ms: u64,
    jitter: f64,
    max_attempts: Option<u32>,
    attempts: u32,
}

impl ReconnectBackoff {
    pub fn from_options(options: &ConnectionOptions) -> Self {
        Self {
            base_ms: options.reconnect_delay_ms,
            max_ms: options.max_reconnect_delay_ms.max(options.reconnect_delay_ms),
            jitter: options.reconnect_jitter.clamp(0.0, 1.0),
            max_attempts: options.max_reconnect_attempts,
            attempts: 0,
        }
    }

    /// Number of attempts started since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns `true` once every allowed attempt has been used.
    pub fn is_exhausted(&self) -> bool {
        self.max_attempts.map_or(false, |max| self.attempts >= max)
    }

    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Delay before the next attempt, without jitter.
    pub fn nominal_delay(&self) -> Duration {
        let factor = 2u64.saturating_pow(self.attempts.min(63));
        Duration::from_millis(self.base_ms.saturating_mul(factor).min(self.max_ms))
    }

    /// Delay before the next attempt, jittered and clamped to the maximum.
    pub fn next_delay(&self) -> Duration {
        let nominal = self.nominal_delay().as_millis() as f64;
        if self.jitter <= 0.0 || nominal <= 0.0 {
            return Duration::from_millis(nominal as u64);
        }
        let offset = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        let jittered = (nominal * (1.0 + offset)).round().max(0.0) as u64;
        Duration::from_millis(jittered.min(self.max_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff(base: u64, max: u64, jitter: f64, attempts: Option<u32>) -> ReconnectBackoff {
        ReconnectBackoff::from_options(
            &ConnectionOptions::default()
                .with_reconnect_delay_ms(base)
                .with_max_reconnect_delay_ms(max)
                .with_reconnect_jitter(jitter)
                .with_max_reconnect_attempts(attempts),
        )
    }

    #[test]
    fn test_exponential_growth_is_bounded() {
        let mut b = backoff(100, 1000, 0.0, None);
        let mut delays = Vec::new();
        for _ in 0..6 {
            delays.push(b.next_delay().as_millis() as u64);
            b.record_attempt();
        }
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
    }

    #[test]
    fn test_jitter_stays_within_window_and_bound() {
        let mut b = backoff(1000, 1500, 0.2, None);
        for _ in 0..200 {
            let d = b.next_delay().as_millis() as u64;
            assert!((800..=1200).contains(&d), "delay {} outside +/-20%", d);
        }
        b.record_attempt();
        for _ in 0..200 {
            let d = b.next_delay().as_millis() as u64;
            assert!((1200..=1500).contains(&d), "delay {} outside bound", d);
        }
    }

    #[test]
    fn test_exhaustion_and_reset() {
        let mut b = backoff(10, 100, 0.0, Some(2));
        assert!(!b.is_exhausted());
        b.record_attempt();
        b.record_attempt();
        assert!(b.is_exhausted());
        assert_eq!(b.attempts(), 2);
        b.reset();
        assert!(!b.is_exhausted());
        assert_eq!(b.nominal_delay(), Duration::from_millis(10));
    }

    #[test]
    fn test_zero_attempts_is_exhausted_immediately() {
        assert!(backoff(10, 100, 0.0, Some(0)).is_exhausted());
    }

    #[test]
    fn test_huge_attempt_count_does_not_overflow() {
        let mut b = backoff(1000, 30_000, 0.0, None);
        for _ in 0..200 {
            b.record_attempt();
        }
        assert_eq!(b.nominal_delay(), Duration::from_millis(30_000));
    }
}
