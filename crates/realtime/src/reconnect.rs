//! Reconnect policy with jittered exponential back-off.

use std::time::Duration;

use rand::Rng;
use sc_domain::config::RealtimeConfig;

/// Controls how the connection manager reconnects after a failure.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    /// Base delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum exponential delay between attempts (cap, before jitter).
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt.
    pub backoff_factor: f64,
    /// Upper bound of the uniform random delay added on top.
    pub jitter: Duration,
    /// Socket opens allowed per sequence; `0` fails before the first open.
    pub max_attempts: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

impl ReconnectBackoff {
    pub fn from_config(cfg: &RealtimeConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(cfg.initial_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            backoff_factor: cfg.backoff_factor,
            jitter: Duration::from_millis(cfg.jitter_ms),
            max_attempts: cfg.max_reconnect_attempts,
        }
    }

    /// Compute the delay for the given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.backoff_factor.powi(attempt.min(i32::MAX as u32) as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        // Random spread so many clients dropped together don't reconnect in lockstep.
        let jitter_ms = match self.jitter.as_millis() as u64 {
            0 => 0,
            max => rand::thread_rng().gen_range(0..=max),
        };
        Duration::from_millis(capped_ms as u64 + jitter_ms)
    }

    /// Whether attempt `attempt` (0-indexed) is past the budget.
    pub fn should_give_up(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}
