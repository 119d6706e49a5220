//! In-memory connector for tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use redshard_types::Endpoint;

use crate::connector::Connector;

/// Connection handed out by [`MockConnector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockConnection {
    /// Unique per dial, so tests can tell reuse from redial
    pub id: u64,
    pub endpoint: Endpoint,
}

/// Connector that never touches the network.
#[derive(Debug, Default)]
pub struct MockConnector {
    next_id: AtomicU64,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent dial fail with `ConnectionRefused`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every subsequent dial.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Number of successful dials so far.
    pub fn dialed(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self, endpoint: &Endpoint) -> std::io::Result<MockConnection> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("mock refused {}", endpoint),
            ));
        }
        Ok(MockConnection {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            endpoint: endpoint.clone(),
        })
    }
}
