//! Reconnect policy for the realtime channel.

use std::time::Duration;

/// Controls how often a dropped connection is redialed and how long to wait
/// between attempts using exponential backoff.
///
/// Attempts are 1-based: the first redial after a drop is attempt 1 and
/// waits `base_delay`, attempt 2 waits twice that, and so on. A clean close
/// or an explicit disconnect never retries; the attempt counter resets to
/// zero whenever a connection is established.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Maximum number of reconnect attempts before giving up
    pub max_attempts: u32,
    /// Delay before the first attempt (doubles each attempt)
    pub base_delay: Duration,
    /// Ceiling on the computed delay
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Whether the given 1-based attempt is still within budget.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    /// Delay before the given 1-based attempt: `base_delay * 2^(attempt-1)`,
    /// capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }
}
