//! Fixed-interval retry policy for connect attempts

use std::time::Duration;

use tokio::time::Instant;

use tr_core::config::DispatchConfig;

use crate::host::HostDescriptor;

/// Decides when a host may be tried again and when it is given up
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Cooldown between attempts to the same host
    interval: Duration,
    /// Consecutive failures after which the host is exhausted
    max_retries: u32,
}

impl RetryPolicy {
    /// Create a policy from configuration
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.retry_interval, config.max_retries)
    }

    /// Create a policy with custom parameters; `max_retries` of 0 is treated as 1
    pub fn new(interval: Duration, max_retries: u32) -> Self {
        Self {
            interval,
            max_retries: max_retries.max(1),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether the host has used up its retry budget
    pub fn is_exhausted(&self, host: &HostDescriptor) -> bool {
        host.retry_count() >= self.max_retries
    }

    /// Whether the cooldown since the last attempt has passed
    pub fn cooldown_elapsed(&self, host: &HostDescriptor, now: Instant) -> bool {
        match host.last_attempt() {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        }
    }

    /// Time until the host may be attempted again
    pub fn ready_in(&self, host: &HostDescriptor, now: Instant) -> Duration {
        match host.last_attempt() {
            Some(last) => (last + self.interval).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }
}
