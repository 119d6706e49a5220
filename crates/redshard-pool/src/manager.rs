//! Connection pool manager - owns the endpoint -> pool mapping.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use redshard_types::Endpoint;

use crate::config::PoolConfig;
use crate::connector::Connector;
use crate::error::PoolError;
use crate::pool::{CloseAttempt, EndpointPool, Lease, Lifecycle, PooledConnection};

type PoolMap<C> = DashMap<Endpoint, Arc<EndpointPool<C>>>;

/// Counters exposed for introspection and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub pools_created: u64,
    pub pools_closed: u64,
    pub connections_dialed: u64,
    pub active_pools: usize,
    pub retiring_pools: usize,
}

/// Point-in-time view of one endpoint's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolInfo {
    /// Connections currently checked out (plus acquires in progress)
    pub leased: usize,
    pub idle: usize,
    pub retiring: bool,
}

#[derive(Default)]
struct Counters {
    pools_created: AtomicU64,
    pools_closed: AtomicU64,
    connections_dialed: AtomicU64,
}

/// Owns one pool per endpoint.
///
/// Pools are created on the first [`acquire`](Self::acquire) for an endpoint,
/// never by routing lookups. [`reconcile`](Self::reconcile) retires pools for
/// endpoints the live range table no longer references.
pub struct ConnectionPoolManager<C: Connector> {
    connector: Arc<C>,
    config: PoolConfig,
    pools: Arc<PoolMap<C>>,
    retiring: Arc<PoolMap<C>>,
    // Endpoints of the last reconciled table; `None` until the first reconcile.
    live: RwLock<Option<BTreeSet<Endpoint>>>,
    counters: Arc<Counters>,
    shut_down: AtomicBool,
}

impl<C: Connector> ConnectionPoolManager<C> {
    pub fn new(connector: C, config: PoolConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            pools: Arc::new(DashMap::new()),
            retiring: Arc::new(DashMap::new()),
            live: RwLock::new(None),
            counters: Arc::new(Counters::default()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Check out a connection to `endpoint`.
    ///
    /// Waits at most `acquire_timeout` for a free slot and `dial_timeout` for
    /// a cold dial. A pool that is retiring but not yet closed still serves
    /// callers that routed under the previous table.
    pub async fn acquire(&self, endpoint: &Endpoint) -> Result<PooledConnection<C>, PoolError> {
        let lease = self.lease(endpoint)?;
        let pool = lease.pool().clone();

        let permit = match timeout(self.config.acquire_timeout, pool.permits().acquire_owned())
            .await
        {
            Ok(Ok(permit)) => permit,
            // Permits close only once the pool is closed or the manager stops.
            Ok(Err(_)) => return Err(PoolError::Shutdown),
            Err(_) => {
                warn!(
                    endpoint = %endpoint,
                    max_size = self.config.max_size,
                    "Connection pool exhausted"
                );
                return Err(PoolError::PoolExhausted {
                    endpoint: endpoint.clone(),
                    waited: self.config.acquire_timeout,
                });
            }
        };

        let conn = match pool.take_idle() {
            Some(conn) => conn,
            None => self.dial(endpoint).await?,
        };

        Ok(PooledConnection::new(conn, permit, lease))
    }

    async fn dial(&self, endpoint: &Endpoint) -> Result<C::Connection, PoolError> {
        debug!(endpoint = %endpoint, "Dialing new connection");
        match timeout(self.config.dial_timeout, self.connector.connect(endpoint)).await {
            Ok(Ok(conn)) => {
                self.counters.connections_dialed.fetch_add(1, Ordering::Relaxed);
                Ok(conn)
            }
            Ok(Err(source)) => {
                warn!(endpoint = %endpoint, error = %source, "Dial failed");
                Err(PoolError::DialFailure {
                    endpoint: endpoint.clone(),
                    source,
                })
            }
            Err(_) => {
                warn!(endpoint = %endpoint, timeout = ?self.config.dial_timeout, "Dial timed out");
                Err(PoolError::DialTimeout {
                    endpoint: endpoint.clone(),
                    timeout: self.config.dial_timeout,
                })
            }
        }
    }

    /// Find or create the pool for `endpoint` and take a lease on it.
    fn lease(&self, endpoint: &Endpoint) -> Result<Lease<C>, PoolError> {
        loop {
            if self.is_shut_down() {
                return Err(PoolError::Shutdown);
            }

            let active = self.pools.get(endpoint).map(|p| p.value().clone());
            if let Some(pool) = active {
                if let Some(lease) = EndpointPool::try_lease(&pool) {
                    return self.admit(lease);
                }
                self.pools.remove_if(endpoint, |_, p| Arc::ptr_eq(p, &pool));
                continue;
            }

            // Reconcile inserts into `retiring` before removing from `pools`,
            // so checking in this order never misses a pool mid-move.
            let retiring = self.retiring.get(endpoint).map(|p| p.value().clone());
            if let Some(lease) = retiring.as_ref().and_then(EndpointPool::try_lease) {
                return self.admit(lease);
            }

            let mut created = false;
            let pool = self
                .pools
                .entry(endpoint.clone())
                .or_insert_with(|| {
                    created = true;
                    self.counters.pools_created.fetch_add(1, Ordering::Relaxed);
                    info!(
                        endpoint = %endpoint,
                        max_size = self.config.max_size,
                        "Creating connection pool"
                    );
                    Arc::new(EndpointPool::new(endpoint.clone(), self.config.max_size))
                })
                .value()
                .clone();
            if let Some(lease) = EndpointPool::try_lease(&pool) {
                let lease = self.admit(lease)?;
                if created && !self.is_live(endpoint) {
                    // Routed under an older table: serve this caller, then close.
                    debug!(endpoint = %endpoint, "Pool created for unrouted endpoint");
                    self.retire_pool(pool);
                }
                return Ok(lease);
            }
        }
    }

    /// Reject a lease taken while `shutdown` was starting.
    ///
    /// The flag is re-read after the pool is in the map, so either `shutdown`
    /// saw the pool or this check sees the flag.
    fn admit(&self, lease: Lease<C>) -> Result<Lease<C>, PoolError> {
        if !self.is_shut_down() {
            return Ok(lease);
        }
        let pool = lease.pool().clone();
        drop(lease);
        self.pools.remove_if(pool.endpoint(), |_, p| Arc::ptr_eq(p, &pool));
        Err(PoolError::Shutdown)
    }

    fn is_live(&self, endpoint: &Endpoint) -> bool {
        self.live
            .read()
            .as_ref()
            .map_or(true, |live| live.contains(endpoint))
    }

    /// Align pools with the endpoints of the live range table.
    ///
    /// Pools for absent endpoints close after the drain grace period and
    /// once every outstanding lease is released. Pools for present endpoints
    /// are left alone, and a retiring pool whose endpoint returned is revived.
    /// Never creates pools. Must be called from within a Tokio runtime.
    pub fn reconcile(&self, live: &BTreeSet<Endpoint>) {
        if self.is_shut_down() {
            return;
        }
        // Published before the scan, so a pool created concurrently is either
        // seen below or sees this set in `lease`.
        *self.live.write() = Some(live.clone());

        for endpoint in live {
            let retiring = self.retiring.get(endpoint).map(|p| p.value().clone());
            let Some(pool) = retiring else { continue };
            if !pool.revive() {
                continue;
            }
            let restored = match self.pools.entry(endpoint.clone()) {
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(pool.clone());
                    true
                }
                dashmap::mapref::entry::Entry::Occupied(_) => false,
            };
            if restored {
                self.retiring.remove_if(endpoint, |_, p| Arc::ptr_eq(p, &pool));
                info!(endpoint = %endpoint, "Endpoint routed again, retirement cancelled");
            } else {
                // A fresh pool already took its place; let this one drain out.
                self.schedule_close(pool);
            }
        }

        let stale: Vec<Arc<EndpointPool<C>>> = self
            .pools
            .iter()
            .filter(|entry| !live.contains(entry.key()))
            .map(|entry| entry.value().clone())
            .collect();

        for pool in stale {
            self.retire_pool(pool);
        }
    }

    /// Move an active pool to `retiring` and schedule its close.
    fn retire_pool(&self, pool: Arc<EndpointPool<C>>) {
        let endpoint = pool.endpoint().clone();
        self.retiring.insert(endpoint.clone(), pool.clone());
        self.pools.remove_if(&endpoint, |_, p| Arc::ptr_eq(p, &pool));
        info!(
            endpoint = %endpoint,
            leased = pool.leases(),
            grace = ?self.config.drain_grace,
            "Retiring connection pool"
        );
        self.schedule_close(pool);
    }

    fn schedule_close(&self, pool: Arc<EndpointPool<C>>) {
        let epoch = pool.retire();
        let grace = self.config.drain_grace;
        let retiring = self.retiring.clone();
        let counters = self.counters.clone();

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            drain_and_close(pool, epoch, &retiring, &counters).await;
        });
    }

    /// Close every pool, waiting for outstanding connections to be returned.
    ///
    /// New acquires fail with [`PoolError::Shutdown`] as soon as this starts.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut all: Vec<Arc<EndpointPool<C>>> =
            self.pools.iter().map(|e| e.value().clone()).collect();
        all.extend(self.retiring.iter().map(|e| e.value().clone()));
        for pool in &all {
            self.retiring.insert(pool.endpoint().clone(), pool.clone());
        }
        self.pools.clear();

        info!(pools = all.len(), "Shutting down connection pools");

        let closes = all.into_iter().map(|pool| {
            let epoch = pool.retire();
            drain_and_close(pool, epoch, &self.retiring, &self.counters)
        });
        futures::future::join_all(closes).await;

        info!("Connection pools shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            pools_created: self.counters.pools_created.load(Ordering::Relaxed),
            pools_closed: self.counters.pools_closed.load(Ordering::Relaxed),
            connections_dialed: self.counters.connections_dialed.load(Ordering::Relaxed),
            active_pools: self.pools.len(),
            retiring_pools: self.retiring.len(),
        }
    }

    /// State of the open pool for `endpoint`, if any.
    pub fn pool_info(&self, endpoint: &Endpoint) -> Option<PoolInfo> {
        let pool = self
            .pools
            .get(endpoint)
            .map(|p| p.value().clone())
            .or_else(|| self.retiring.get(endpoint).map(|p| p.value().clone()))?;

        match pool.lifecycle() {
            Lifecycle::Closed => None,
            lifecycle => Some(PoolInfo {
                leased: pool.leases(),
                idle: pool.idle_count(),
                retiring: matches!(lifecycle, Lifecycle::Retiring { .. }),
            }),
        }
    }

    /// Endpoints with an active (non-retiring) pool.
    pub fn endpoints(&self) -> BTreeSet<Endpoint> {
        self.pools.iter().map(|e| e.key().clone()).collect()
    }
}

async fn drain_and_close<C: Connector>(
    pool: Arc<EndpointPool<C>>,
    epoch: u64,
    retiring: &PoolMap<C>,
    counters: &Counters,
) {
    loop {
        pool.wait_drained().await;
        match pool.try_close(epoch) {
            CloseAttempt::Closed => {
                retiring.remove_if(pool.endpoint(), |_, p| Arc::ptr_eq(p, &pool));
                counters.pools_closed.fetch_add(1, Ordering::Relaxed);
                info!(endpoint = %pool.endpoint(), "Connection pool closed");
                return;
            }
            CloseAttempt::Busy => continue,
            CloseAttempt::Superseded => {
                debug!(endpoint = %pool.endpoint(), "Pool retirement superseded");
                return;
            }
        }
    }
}
