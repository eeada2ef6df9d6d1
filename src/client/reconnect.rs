//! Reconnection scheduling
//!
//! The gateway is expected to come back on its own, so the policy is a
//! fixed delay between attempts rather than a backoff curve. An optional cap
//! bounds the number of consecutive failed cycles.

use crate::config::ReconnectConfig;
use std::time::Duration;

/// Tracks consecutive reconnect attempts for one client
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    delay: Duration,
    max_attempts: Option<u32>,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            delay,
            max_attempts,
            attempts: 0,
        }
    }

    /// Claim the next attempt. Returns the delay to wait first, or `None`
    /// once the cap is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max_attempts) = self.max_attempts {
            if self.attempts >= max_attempts {
                return None;
            }
        }
        self.attempts += 1;
        Some(self.delay)
    }

    /// Forget previous failures after a successful connection
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self::new(config.delay, config.max_attempts)
    }
}
