//! Redshard shared types
//!
//! Types that cross crate boundaries in the range-sharding router:
//!
//! - [`ShardRange`]: one half-open `[start, end)` key interval bound to a backend host
//! - [`Endpoint`]: the connection target derived from a host string
//! - [`RangeDescriptor`]: a raw range entry as it arrives from the config payload
//! - [`ValidationError`]: every way a candidate range table can be rejected

pub mod endpoint;
pub mod error;
pub mod payload;
pub mod range;

pub use endpoint::Endpoint;
pub use error::ValidationError;
pub use payload::{parse_payload, RangeDescriptor};
pub use range::ShardRange;
