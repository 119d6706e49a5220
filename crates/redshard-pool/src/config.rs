//! Pool configuration

use std::time::Duration;

/// Limits and timeouts shared by every endpoint pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum connections checked out of one pool at a time
    pub max_size: usize,

    /// How long `acquire` waits for a free slot before `PoolExhausted`
    pub acquire_timeout: Duration,

    /// How long a cold dial may take before `DialTimeout`
    pub dial_timeout: Duration,

    /// Delay between an endpoint leaving the range table and its pool
    /// closing; outstanding leases extend it further
    pub drain_grace: Duration,
}

impl PoolConfig {
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_drain_grace(mut self, drain_grace: Duration) -> Self {
        self.drain_grace = drain_grace;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 16,
            acquire_timeout: Duration::from_secs(2),
            dial_timeout: Duration::from_secs(1),
            drain_grace: Duration::from_secs(30),
        }
    }
}
