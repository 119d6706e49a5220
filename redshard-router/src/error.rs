//! Router service error types

use redshard_pool::PoolError;
use redshard_types::Endpoint;
use thiserror::Error;

/// Request-scoped failures surfaced to the serving layer.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Key is outside every range; maps to a not-found response
    #[error("No shard for key {key}")]
    NoShard { key: i64 },

    /// No range table has been published yet
    #[error("Router has no range table yet")]
    NotReady,

    /// Retries exhausted or the pool manager is shutting down
    #[error("Service unavailable for {endpoint} after {attempts} attempt(s): {source}")]
    ServiceUnavailable {
        endpoint: Endpoint,
        attempts: u32,
        source: PoolError,
    },
}

/// Failures of a config watch source.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Watch I/O error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid watch path: {0}")]
    InvalidPath(String),
}
