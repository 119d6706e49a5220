//! Shard range type

use serde::Serialize;

use crate::endpoint::Endpoint;
use crate::error::ValidationError;

/// A half-open key interval `[start, end)` assigned to one backend host.
///
/// Serializes as `{start, end, host}`, the shape the introspection surface
/// exposes. The derived [`Endpoint`] is kept alongside so the lookup path
/// never re-parses the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardRange {
    start: i64,
    end: i64,
    host: String,
    #[serde(skip)]
    endpoint: Endpoint,
}

impl ShardRange {
    /// Create a range, checking the host shape and that `start < end`.
    pub fn new(start: i64, end: i64, host: impl Into<String>) -> Result<Self, ValidationError> {
        let host = host.into();
        let endpoint = Endpoint::from_host(&host)?;
        if start >= end {
            return Err(ValidationError::NonMonotonicBoundaries { start, end, host });
        }
        Ok(Self {
            start,
            end,
            host,
            endpoint,
        })
    }

    /// Inclusive lower bound
    pub fn start(&self) -> i64 {
        self.start
    }

    /// Exclusive upper bound
    pub fn end(&self) -> i64 {
        self.end
    }

    /// Full `"<label>:<poolPort>:<dataPort>"` host string
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns true if `key` falls inside `[start, end)`.
    pub fn contains(&self, key: i64) -> bool {
        key >= self.start && key < self.end
    }

    /// Number of keys in the range.
    pub fn width(&self) -> u64 {
        self.end.abs_diff(self.start)
    }
}
