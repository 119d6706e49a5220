//! Redshard Router - Hot-Reconfigurable Shard Routing Service
//!
//! Wires the range router and the connection pools to a config watch:
//!
//! ```text
//! ConfigWatch ──events──▶ ConfigReconciler ──reconfigure──▶ ShardRouter
//!                               │                              ▲
//!                               └──reconcile──▶ Pools          │ lookup
//!                                                 ▲            │
//!                                                 └─acquire── ShardService
//! ```
//!
//! The reconciler is the only writer of the range table. Request handlers
//! go through [`ShardService`], which never blocks on a reconfiguration.

pub mod config;
pub mod error;
pub mod reconciler;
pub mod service;
pub mod watch;

pub use config::NodeConfig;
pub use error::{RoutingError, WatchError};
pub use reconciler::{watch_channel, ConfigReconciler, ReconcileOutcome, ReconcilerStats};
pub use service::{RetryPolicy, ShardService};
pub use watch::{
    ChangeKind, ConfigWatch, FileWatch, MemoryWatch, WatchCallback, WatchEvent, WatchMetadata,
    WatchSubscription,
};

// Re-exports for embedders
pub use redshard_pool::{ConnectionPoolManager, Connector, PoolConfig, PoolError, TcpConnector};
pub use redshard_router_core::{Endpoint, RangeTable, ShardRange, ShardRouter, ValidationError};
