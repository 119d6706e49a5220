//! Redshard Pool - Per-Endpoint Connection Pools
//!
//! One pool per distinct [`Endpoint`], created lazily on the first
//! [`ConnectionPoolManager::acquire`] and shared across requests and across
//! range table generations.
//!
//! # Pool lifecycle
//!
//! ```text
//!   acquire (first use)        reconcile (endpoint absent)
//!  ─────────────────▶ Active ─────────────────────────▶ Retiring
//!                       ▲                                  │
//!                       └──── reconcile (endpoint back) ───┤
//!                                                          │ grace elapsed
//!                                                          │ + all leases released
//!                                                          ▼
//!                                                        Closed
//! ```
//!
//! Every [`PooledConnection`] holds a lease on its pool. A pool never closes
//! while a lease is outstanding, so a request that acquired a connection
//! under an old range table finishes normally after the table is replaced.

mod config;
mod connector;
mod error;
mod manager;
mod pool;

#[cfg(any(test, feature = "test-utils"))]
mod mock;

pub use config::PoolConfig;
pub use connector::{Connector, TcpConnector};
pub use error::PoolError;
pub use manager::{ConnectionPoolManager, PoolInfo, PoolStats};
pub use pool::PooledConnection;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockConnection, MockConnector};

pub use redshard_types::Endpoint;
