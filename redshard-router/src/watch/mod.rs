//! Config watch sources
//!
//! A watch delivers the current contents of a config path once on subscribe
//! and again after every write, at least once per change. A transient
//! disconnect is reported as a [`ChangeKind::Reconnected`] re-delivery of
//! the current data, never as an error.
//!
//! - [`MemoryWatch`]: in-process store, for tests and embedding
//! - [`FileWatch`]: polls a file on disk

mod file;
mod memory;

pub use file::FileWatch;
pub use memory::MemoryWatch;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use crate::error::WatchError;

/// Why a watch event fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    /// First delivery after subscribing
    Initial,
    /// The watched data was written or deleted
    Changed,
    /// Connection to the source recovered; data may be unchanged
    Reconnected,
}

/// Metadata accompanying a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WatchMetadata {
    /// Source-assigned version, increasing per write
    pub version: u64,
    pub kind: ChangeKind,
}

/// One delivery from a watch source.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub path: String,
    /// `None` when the path does not exist or could not be read
    pub payload: Option<Bytes>,
    pub metadata: WatchMetadata,
}

/// Callback invoked for every delivery. Must not block.
pub type WatchCallback = Arc<dyn Fn(WatchEvent) + Send + Sync>;

/// A source of change notifications for config paths.
#[async_trait]
pub trait ConfigWatch: Send + Sync {
    /// Subscribe to `path`. `on_change` fires once with the current data and
    /// again on every subsequent write.
    async fn subscribe(
        &self,
        path: &str,
        on_change: WatchCallback,
    ) -> Result<WatchSubscription, WatchError>;
}

/// Live subscription. Dropping it stops deliveries.
pub struct WatchSubscription {
    id: Uuid,
    path: String,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl WatchSubscription {
    pub(crate) fn new(path: &str, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.to_string(),
            cancel: Some(Box::new(cancel)),
        }
    }

    pub(crate) fn with_id(id: Uuid, path: &str, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            path: path.to_string(),
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Stop deliveries now.
    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for WatchSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSubscription")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish()
    }
}
