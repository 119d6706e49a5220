//! Configuration for the redshard node

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use redshard_pool::PoolConfig;

use crate::service::RetryPolicy;

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// File holding the range table JSON
    pub ranges_path: PathBuf,

    /// How often the file watch re-reads `ranges_path`
    pub poll_interval: Duration,

    /// Connections per endpoint
    pub pool_max_size: usize,

    pub acquire_timeout: Duration,

    pub dial_timeout: Duration,

    /// Delay before a pool for a removed endpoint starts closing
    pub drain_grace: Duration,

    /// Acquire attempts per request, including the first
    pub retry_attempts: u32,

    /// Log level
    pub log_level: String,
}

impl NodeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let ranges_path = lookup("REDSHARD_RANGES_PATH")
            .map(PathBuf::from)
            .context("REDSHARD_RANGES_PATH is required")?;

        let config = Self {
            ranges_path,
            poll_interval: millis(&lookup, "REDSHARD_POLL_INTERVAL_MS")?
                .unwrap_or(defaults.poll_interval),
            pool_max_size: parse(&lookup, "REDSHARD_POOL_MAX_SIZE")?
                .unwrap_or(defaults.pool_max_size),
            acquire_timeout: millis(&lookup, "REDSHARD_ACQUIRE_TIMEOUT_MS")?
                .unwrap_or(defaults.acquire_timeout),
            dial_timeout: millis(&lookup, "REDSHARD_DIAL_TIMEOUT_MS")?
                .unwrap_or(defaults.dial_timeout),
            drain_grace: millis(&lookup, "REDSHARD_DRAIN_GRACE_MS")?
                .unwrap_or(defaults.drain_grace),
            retry_attempts: parse(&lookup, "REDSHARD_RETRY_ATTEMPTS")?
                .unwrap_or(defaults.retry_attempts),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ranges_path.as_os_str().is_empty() {
            anyhow::bail!("Ranges path must not be empty");
        }
        if self.pool_max_size == 0 {
            anyhow::bail!("Pool max size must be at least 1");
        }
        if self.retry_attempts == 0 {
            anyhow::bail!("Retry attempts must be at least 1");
        }
        if self.poll_interval.is_zero() {
            anyhow::bail!("Poll interval must be positive");
        }
        Ok(())
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_size: self.pool_max_size,
            acquire_timeout: self.acquire_timeout,
            dial_timeout: self.dial_timeout,
            drain_grace: self.drain_grace,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            ..RetryPolicy::default()
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        let pool = PoolConfig::default();
        Self {
            ranges_path: PathBuf::from("./ranges.json"),
            poll_interval: Duration::from_millis(500),
            pool_max_size: pool.max_size,
            acquire_timeout: pool.acquire_timeout,
            dial_timeout: pool.dial_timeout,
            drain_grace: pool.drain_grace,
            retry_attempts: RetryPolicy::default().max_attempts,
            log_level: "info".to_string(),
        }
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .with_context(|| format!("Invalid {}: {:?}", key, raw))
        })
        .transpose()
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> anyhow::Result<Option<Duration>> {
    let ms: Option<u64> = parse(lookup, key)?;
    Ok(ms.map(Duration::from_millis))
}
