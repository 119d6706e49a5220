//! Pool error types

use std::time::Duration;

use redshard_types::Endpoint;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Pool exhausted for {endpoint}: no free connection within {waited:?}")]
    PoolExhausted { endpoint: Endpoint, waited: Duration },

    #[error("Dial failure for {endpoint}: {source}")]
    DialFailure {
        endpoint: Endpoint,
        source: std::io::Error,
    },

    #[error("Dial to {endpoint} timed out after {timeout:?}")]
    DialTimeout { endpoint: Endpoint, timeout: Duration },

    #[error("Connection pool manager is shut down")]
    Shutdown,
}

impl PoolError {
    /// Transient errors are worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PoolError::PoolExhausted { .. }
                | PoolError::DialFailure { .. }
                | PoolError::DialTimeout { .. }
        )
    }
}
