//! A single endpoint's pool, its leases, and checked-out connections.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use redshard_types::Endpoint;

use crate::connector::Connector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Active,
    Retiring { epoch: u64 },
    Closed,
}

/// Result of a close attempt on a retiring pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseAttempt {
    Closed,
    /// A lease was taken after the last drain; wait again
    Busy,
    /// Revived or already closed by someone else
    Superseded,
}

struct PoolState {
    lifecycle: Lifecycle,
    leases: usize,
    epoch: u64,
}

pub(crate) struct EndpointPool<C: Connector> {
    endpoint: Endpoint,
    idle: Mutex<Vec<C::Connection>>,
    permits: Arc<Semaphore>,
    // Lifecycle and lease count change together so that a close can never
    // slip in between "pool is open" and "lease taken".
    state: Mutex<PoolState>,
    drained: Notify,
}

impl<C: Connector> EndpointPool<C> {
    pub(crate) fn new(endpoint: Endpoint, max_size: usize) -> Self {
        Self {
            endpoint,
            idle: Mutex::new(Vec::new()),
            permits: Arc::new(Semaphore::new(max_size)),
            state: Mutex::new(PoolState {
                lifecycle: Lifecycle::Active,
                leases: 0,
                epoch: 0,
            }),
            drained: Notify::new(),
        }
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub(crate) fn permits(&self) -> Arc<Semaphore> {
        self.permits.clone()
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        self.state.lock().lifecycle
    }

    pub(crate) fn leases(&self) -> usize {
        self.state.lock().leases
    }

    pub(crate) fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Take a lease unless the pool is closed.
    pub(crate) fn try_lease(pool: &Arc<Self>) -> Option<Lease<C>> {
        let mut state = pool.state.lock();
        if state.lifecycle == Lifecycle::Closed {
            return None;
        }
        state.leases += 1;
        Some(Lease { pool: pool.clone() })
    }

    /// Mark retiring and return the epoch a later close must match.
    pub(crate) fn retire(&self) -> u64 {
        let mut state = self.state.lock();
        state.epoch += 1;
        if state.lifecycle != Lifecycle::Closed {
            state.lifecycle = Lifecycle::Retiring { epoch: state.epoch };
        }
        state.epoch
    }

    /// Cancel a pending retirement. Returns false if the pool is not retiring.
    pub(crate) fn revive(&self) -> bool {
        let mut state = self.state.lock();
        match state.lifecycle {
            Lifecycle::Retiring { .. } => {
                state.epoch += 1;
                state.lifecycle = Lifecycle::Active;
                true
            }
            Lifecycle::Active | Lifecycle::Closed => false,
        }
    }

    /// Wait until no lease is outstanding.
    pub(crate) async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            let leases = self.state.lock().leases;
            if leases == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Close the pool if it is still retiring under `epoch` and unleased.
    pub(crate) fn try_close(&self, epoch: u64) -> CloseAttempt {
        let mut state = self.state.lock();
        match state.lifecycle {
            Lifecycle::Retiring { epoch: current } if current == epoch => {}
            _ => return CloseAttempt::Superseded,
        }
        if state.leases > 0 {
            return CloseAttempt::Busy;
        }
        state.lifecycle = Lifecycle::Closed;
        self.permits.close();
        let idle = std::mem::take(&mut *self.idle.lock());
        drop(state);

        debug!(endpoint = %self.endpoint, connections = idle.len(), "Closing idle connections");
        drop(idle);
        CloseAttempt::Closed
    }

    pub(crate) fn take_idle(&self) -> Option<C::Connection> {
        self.idle.lock().pop()
    }

    fn check_in(&self, conn: C::Connection) {
        // Callers hold a lease, so the pool cannot be closed yet.
        self.idle.lock().push(conn);
    }

    fn release_lease(&self) {
        let mut state = self.state.lock();
        state.leases -= 1;
        if state.leases == 0 {
            self.drained.notify_waiters();
        }
    }
}

/// Keeps a pool open. Dropping it releases the hold.
pub(crate) struct Lease<C: Connector> {
    pool: Arc<EndpointPool<C>>,
}

impl<C: Connector> Lease<C> {
    pub(crate) fn pool(&self) -> &Arc<EndpointPool<C>> {
        &self.pool
    }
}

impl<C: Connector> Drop for Lease<C> {
    fn drop(&mut self) {
        self.pool.release_lease();
    }
}

/// A connection checked out of an endpoint pool.
///
/// Dereferences to the underlying connection. Dropping it returns the
/// connection to the pool on every exit path; use [`discard`](Self::discard)
/// for a connection the caller knows is broken.
pub struct PooledConnection<C: Connector> {
    conn: Option<C::Connection>,
    // Drop order matters: the connection is checked in by `Drop::drop`,
    // then the slot is freed, then the lease is released.
    _permit: OwnedSemaphorePermit,
    lease: Lease<C>,
}

impl<C: Connector> PooledConnection<C> {
    pub(crate) fn new(conn: C::Connection, permit: OwnedSemaphorePermit, lease: Lease<C>) -> Self {
        Self {
            conn: Some(conn),
            _permit: permit,
            lease,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.lease.pool.endpoint()
    }

    /// Drop the connection instead of returning it to the pool.
    pub fn discard(mut self) {
        if self.conn.take().is_some() {
            debug!(endpoint = %self.endpoint(), "Discarding pooled connection");
        }
    }
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection is present until drop")
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection is present until drop")
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.lease.pool.check_in(conn);
        }
    }
}

impl<C: Connector> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("endpoint", self.endpoint())
            .finish_non_exhaustive()
    }
}
