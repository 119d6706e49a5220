//! Redshard Router Core - Range-Based Shard Routing
//!
//! Routes integer keys to backend endpoints using a table of half-open key
//! ranges that can be replaced at runtime.
//!
//! # Architecture
//!
//! ```text
//! raw descriptors
//!     │
//!     ▼
//! ┌─────────────────────────┐
//! │   RangeTable::build     │  Sort, validate, reject whole table on first error
//! │   (Is it valid?)        │
//! └───────────┬─────────────┘
//!             │ RangeTable (immutable)
//!             ▼
//! ┌─────────────────────────┐
//! │   ShardRouter           │  Single atomic publish; lookups never block
//! │   (Which endpoint?)     │
//! └─────────────────────────┘
//! ```
//!
//! A [`RangeTable`] can only be obtained through validation, so
//! [`ShardRouter::reconfigure`] never sees an invalid table. Every published
//! table is wrapped in a [`RoutingSnapshot`] carrying a generation number;
//! readers holding an older snapshot keep it alive until they drop it.
//!
//! # Example
//!
//! ```rust,ignore
//! use redshard_router_core::{RangeTable, ShardRouter};
//!
//! let router = ShardRouter::new();
//! let table = RangeTable::from_payload(br#"[[0, 100, "a:1:2"]]"#)?;
//! router.reconfigure(table);
//!
//! assert_eq!(router.lookup(42).unwrap().as_str(), "1:2");
//! assert!(router.lookup(100).is_none());
//! ```

mod router;
mod table;

#[cfg(test)]
mod tests;

pub use router::{Publication, RoutingSnapshot, ShardRouter};
pub use table::RangeTable;

// Re-exports: shared types
pub use redshard_types::{Endpoint, RangeDescriptor, ShardRange, ValidationError};
