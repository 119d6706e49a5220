//! Shard service - request-facing facade over the router and pools.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use redshard_pool::{ConnectionPoolManager, Connector, PoolStats, PooledConnection};
use redshard_router_core::{ShardRange, ShardRouter};

use crate::error::RoutingError;

/// Bounded retry with exponential backoff for transient pool errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Backoff before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
        }
    }
}

/// What request handlers hold: route a key, then check out a connection.
pub struct ShardService<C: Connector> {
    router: Arc<ShardRouter>,
    pools: Arc<ConnectionPoolManager<C>>,
    retry: RetryPolicy,
}

impl<C: Connector> ShardService<C> {
    pub fn new(
        router: Arc<ShardRouter>,
        pools: Arc<ConnectionPoolManager<C>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            router,
            pools,
            retry,
        }
    }

    /// Range owning `key`.
    pub fn lookup(&self, key: i64) -> Result<ShardRange, RoutingError> {
        self.router.route(key).ok_or(if self.router.is_ready() {
            RoutingError::NoShard { key }
        } else {
            RoutingError::NotReady
        })
    }

    /// Route `key` and check out a connection to its shard.
    ///
    /// Transient pool failures are retried with backoff. The key is routed
    /// again before each retry, so a table published in between is honored.
    pub async fn connection_for(
        &self,
        key: i64,
    ) -> Result<(ShardRange, PooledConnection<C>), RoutingError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let range = self.lookup(key)?;

            match self.pools.acquire(range.endpoint()).await {
                Ok(conn) => {
                    debug!(key, endpoint = %range.endpoint(), attempt, "Acquired shard connection");
                    return Ok((range, conn));
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let backoff = self.retry.backoff(attempt);
                    debug!(
                        key,
                        endpoint = %range.endpoint(),
                        attempt,
                        error = %e,
                        ?backoff,
                        "Retrying acquire"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    warn!(
                        key,
                        endpoint = %range.endpoint(),
                        attempt,
                        error = %e,
                        "Shard unavailable"
                    );
                    return Err(RoutingError::ServiceUnavailable {
                        endpoint: range.endpoint().clone(),
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    /// Introspection: active ranges in ascending order.
    pub fn list_ranges(&self) -> Vec<ShardRange> {
        self.router.list_ranges()
    }

    pub fn generation(&self) -> u64 {
        self.router.generation()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pools.stats()
    }
}
