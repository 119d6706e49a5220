//! Config reconciler - turns watch deliveries into published range tables.
//!
//! The watch callback only forwards events onto a channel; a single
//! [`ConfigReconciler::run`] loop consumes them, so reconfiguration is
//! serialized without ever blocking lookups.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use redshard_pool::{ConnectionPoolManager, Connector};
use redshard_router_core::{RangeTable, ShardRouter, ValidationError};

use crate::watch::{ChangeKind, WatchCallback, WatchEvent};

/// What a single delivery did to the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A new table was published
    Applied { generation: u64 },
    /// Payload matches the active table; nothing was touched
    Unchanged,
    /// Payload failed validation; previous table kept
    Rejected(ValidationError),
    /// Payload missing or empty; previous table kept
    NoData,
    /// Delivered after a newer version; ignored
    Stale { version: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilerStats {
    pub applied: u64,
    pub unchanged: u64,
    pub rejected: u64,
    pub no_data: u64,
    pub stale: u64,
}

#[derive(Default)]
struct Counters {
    applied: AtomicU64,
    unchanged: AtomicU64,
    rejected: AtomicU64,
    no_data: AtomicU64,
    stale: AtomicU64,
}

/// Create the callback to hand to a watch source and the receiver to pass
/// to [`ConfigReconciler::run`].
pub fn watch_channel() -> (WatchCallback, mpsc::UnboundedReceiver<WatchEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: WatchCallback = Arc::new(move |event: WatchEvent| {
        if tx.send(event).is_err() {
            debug!("Reconciler stopped, dropping watch event");
        }
    });
    (callback, rx)
}

/// Sole writer of the router's range table.
pub struct ConfigReconciler<C: Connector> {
    router: Arc<ShardRouter>,
    pools: Arc<ConnectionPoolManager<C>>,
    counters: Counters,
    // Highest watch version seen
    last_version: AtomicU64,
}

impl<C: Connector> ConfigReconciler<C> {
    pub fn new(router: Arc<ShardRouter>, pools: Arc<ConnectionPoolManager<C>>) -> Self {
        Self {
            router,
            pools,
            counters: Counters::default(),
            last_version: AtomicU64::new(0),
        }
    }

    /// Consume watch events until every sender is gone.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<WatchEvent>) {
        info!("Config reconciler started");
        while let Some(event) = events.recv().await {
            self.apply(&event);
        }
        info!("Config reconciler stopped: watch channel closed");
    }

    /// Apply one delivery.
    ///
    /// A delivery older than one already seen is dropped; an equal version
    /// (a re-delivery) goes through the usual unchanged check.
    pub fn apply(&self, event: &WatchEvent) -> ReconcileOutcome {
        let version = event.metadata.version;
        let newest = self.last_version.fetch_max(version, Ordering::SeqCst);
        if version < newest {
            debug!(path = %event.path, version, newest, "Dropping stale config delivery");
            self.counters.stale.fetch_add(1, Ordering::Relaxed);
            return ReconcileOutcome::Stale { version };
        }

        if event.metadata.kind == ChangeKind::Reconnected {
            info!(
                path = %event.path,
                version,
                "Watch reconnected, re-checking config"
            );
        }
        debug!(
            path = %event.path,
            version = event.metadata.version,
            kind = ?event.metadata.kind,
            "Range config delivery"
        );
        self.apply_payload(event.payload.as_deref())
    }

    /// Validate `payload` and publish it if it differs from the active table.
    ///
    /// Never leaves the router without a table it already had.
    pub fn apply_payload(&self, payload: Option<&[u8]>) -> ReconcileOutcome {
        let payload = match payload {
            Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => bytes,
            _ => {
                warn!("Range config has no data, keeping current table");
                self.counters.no_data.fetch_add(1, Ordering::Relaxed);
                return ReconcileOutcome::NoData;
            }
        };

        let candidate = match RangeTable::from_payload(payload) {
            Ok(table) => table,
            Err(e) => {
                warn!(
                    error = %e,
                    kind = e.kind(),
                    generation = self.router.generation(),
                    "Rejected range config, keeping current table"
                );
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                return ReconcileOutcome::Rejected(e);
            }
        };

        if let Some(active) = self.router.snapshot() {
            if *active.table() == candidate {
                debug!(generation = active.generation(), "Range config unchanged");
                self.counters.unchanged.fetch_add(1, Ordering::Relaxed);
                return ReconcileOutcome::Unchanged;
            }
        }

        let publication = self.router.reconfigure(candidate);
        self.pools.reconcile(&publication.live_endpoints);
        self.counters.applied.fetch_add(1, Ordering::Relaxed);

        for range in self.router.list_ranges() {
            debug!(
                start = range.start(),
                end = range.end(),
                host = %range.host(),
                "Shard range"
            );
        }

        ReconcileOutcome::Applied {
            generation: publication.generation,
        }
    }

    pub fn stats(&self) -> ReconcilerStats {
        ReconcilerStats {
            applied: self.counters.applied.load(Ordering::Relaxed),
            unchanged: self.counters.unchanged.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            no_data: self.counters.no_data.load(Ordering::Relaxed),
            stale: self.counters.stale.load(Ordering::Relaxed),
        }
    }

    pub fn router(&self) -> &Arc<ShardRouter> {
        &self.router
    }
}
