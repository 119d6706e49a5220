//! In-process watch source

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{ChangeKind, ConfigWatch, WatchCallback, WatchEvent, WatchMetadata, WatchSubscription};
use crate::error::WatchError;

#[derive(Default)]
struct Node {
    data: Option<Bytes>,
    version: u64,
}

#[derive(Default)]
struct Inner {
    nodes: RwLock<HashMap<String, Node>>,
    subscribers: RwLock<HashMap<String, Vec<(Uuid, WatchCallback)>>>,
}

/// Watch source backed by an in-memory map of paths.
///
/// Callbacks run synchronously on the writer's thread.
#[derive(Clone, Default)]
pub struct MemoryWatch {
    inner: Arc<Inner>,
}

impl MemoryWatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` at `path` and notify subscribers.
    pub fn write(&self, path: &str, data: impl Into<Bytes>) {
        self.set(path, Some(data.into()));
    }

    /// Remove the data at `path` and notify subscribers.
    pub fn delete(&self, path: &str) {
        self.set(path, None);
    }

    /// Simulate a session re-establishment: re-deliver current data.
    pub fn reconnect(&self, path: &str) {
        let (data, version) = self.current(path);
        self.deliver(path, data, version, ChangeKind::Reconnected);
    }

    pub fn subscriber_count(&self, path: &str) -> usize {
        self.inner
            .subscribers
            .read()
            .get(path)
            .map_or(0, |subs| subs.len())
    }

    fn set(&self, path: &str, data: Option<Bytes>) {
        let version = {
            let mut nodes = self.inner.nodes.write();
            let node = nodes.entry(path.to_string()).or_default();
            node.data = data.clone();
            node.version += 1;
            node.version
        };
        debug!(path = %path, version, "Memory watch write");
        self.deliver(path, data, version, ChangeKind::Changed);
    }

    fn current(&self, path: &str) -> (Option<Bytes>, u64) {
        self.inner
            .nodes
            .read()
            .get(path)
            .map_or((None, 0), |node| (node.data.clone(), node.version))
    }

    fn deliver(&self, path: &str, payload: Option<Bytes>, version: u64, kind: ChangeKind) {
        // Clone the callbacks out so none runs under the lock.
        let callbacks: Vec<WatchCallback> = self
            .inner
            .subscribers
            .read()
            .get(path)
            .map(|subs| subs.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();

        for callback in callbacks {
            callback(WatchEvent {
                path: path.to_string(),
                payload: payload.clone(),
                metadata: WatchMetadata { version, kind },
            });
        }
    }
}

#[async_trait]
impl ConfigWatch for MemoryWatch {
    async fn subscribe(
        &self,
        path: &str,
        on_change: WatchCallback,
    ) -> Result<WatchSubscription, WatchError> {
        if path.is_empty() {
            return Err(WatchError::InvalidPath(path.to_string()));
        }

        let id = Uuid::new_v4();
        self.inner
            .subscribers
            .write()
            .entry(path.to_string())
            .or_default()
            .push((id, on_change.clone()));

        let (data, version) = self.current(path);
        on_change(WatchEvent {
            path: path.to_string(),
            payload: data,
            metadata: WatchMetadata {
                version,
                kind: ChangeKind::Initial,
            },
        });

        let inner = Arc::downgrade(&self.inner);
        let owned_path = path.to_string();
        Ok(WatchSubscription::with_id(id, path, move || {
            if let Some(inner) = inner.upgrade() {
                if let Some(subs) = inner.subscribers.write().get_mut(&owned_path) {
                    subs.retain(|(sub_id, _)| *sub_id != id);
                }
            }
        }))
    }
}
