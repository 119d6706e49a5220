//! Connection endpoints derived from range host strings

use serde::{Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use crate::error::ValidationError;

/// Connection target of a shard, `"<poolPort>:<dataPort>"`.
///
/// Pools are keyed by this value, not by the full host string, so two hosts
/// that differ only in their label share one pool. Cloning is a refcount bump.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint(Arc<str>);

impl Endpoint {
    /// Wrap an already-derived target.
    pub fn new(target: impl Into<Arc<str>>) -> Self {
        Self(target.into())
    }

    /// Derive the endpoint from a `"<label>:<poolPort>:<dataPort>"` host.
    ///
    /// The label is informational and discarded.
    pub fn from_host(host: &str) -> Result<Self, ValidationError> {
        let mut parts = host.split(':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(label), Some(pool_port), Some(data_port), None)
                if !label.is_empty() && !pool_port.is_empty() && !data_port.is_empty() =>
            {
                Ok(Self(format!("{}:{}", pool_port, data_port).into()))
            }
            _ => Err(ValidationError::MalformedPayload(format!(
                "host '{}' is not of the form <label>:<poolPort>:<dataPort>",
                host
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Endpoint {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Endpoint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for Endpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
