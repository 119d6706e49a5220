//! Polling file watch source

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{ChangeKind, ConfigWatch, WatchCallback, WatchEvent, WatchMetadata, WatchSubscription};
use crate::error::WatchError;

/// Watches a file by re-reading it every `poll_interval`.
///
/// A missing file is reported as `payload: None`. Any other read error is
/// treated as a disconnect: it is logged once, and the next successful read
/// is re-delivered as [`ChangeKind::Reconnected`].
#[derive(Debug, Clone)]
pub struct FileWatch {
    poll_interval: Duration,
}

impl FileWatch {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for FileWatch {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

enum Read {
    Data(Bytes),
    Missing,
    Failed(std::io::Error),
}

async fn read(path: &Path) -> Read {
    match tokio::fs::read(path).await {
        Ok(data) => Read::Data(Bytes::from(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Read::Missing,
        Err(e) => Read::Failed(e),
    }
}

struct Poller {
    path: String,
    callback: WatchCallback,
    version: u64,
    last: Option<Bytes>,
    connected: bool,
}

impl Poller {
    fn emit(&self, kind: ChangeKind) {
        (self.callback)(WatchEvent {
            path: self.path.clone(),
            payload: self.last.clone(),
            metadata: WatchMetadata {
                version: self.version,
                kind,
            },
        });
    }

    fn observe(&mut self, read: Read) {
        let current = match read {
            Read::Data(data) => Some(data),
            Read::Missing => None,
            Read::Failed(e) => {
                if self.connected {
                    warn!(path = %self.path, error = %e, "File watch disconnected");
                    self.connected = false;
                }
                return;
            }
        };

        if !self.connected {
            self.connected = true;
            if current != self.last {
                self.version += 1;
            }
            self.last = current;
            info!(path = %self.path, version = self.version, "File watch reconnected");
            self.emit(ChangeKind::Reconnected);
        } else if current != self.last {
            self.version += 1;
            self.last = current;
            debug!(path = %self.path, version = self.version, "File changed");
            self.emit(ChangeKind::Changed);
        }
    }
}

#[async_trait]
impl ConfigWatch for FileWatch {
    async fn subscribe(
        &self,
        path: &str,
        on_change: WatchCallback,
    ) -> Result<WatchSubscription, WatchError> {
        if path.is_empty() {
            return Err(WatchError::InvalidPath(path.to_string()));
        }
        let file = Path::new(path).to_path_buf();
        if let Some(dir) = file.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::metadata(dir).await.map_err(|source| WatchError::Io {
                path: dir.display().to_string(),
                source,
            })?;
        }

        let mut poller = Poller {
            path: path.to_string(),
            callback: on_change,
            version: 0,
            last: None,
            connected: true,
        };
        match read(&file).await {
            Read::Data(data) => {
                poller.version = 1;
                poller.last = Some(data);
            }
            Read::Missing => {}
            Read::Failed(e) => {
                warn!(path = %path, error = %e, "Initial read failed");
                poller.connected = false;
            }
        }
        poller.emit(ChangeKind::Initial);

        let poll_interval = self.poll_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the initial read already happened.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                poller.observe(read(&file).await);
            }
        });

        info!(path = %path, interval = ?poll_interval, "Watching range config file");
        Ok(WatchSubscription::new(path, move || handle.abort()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recorder() -> (WatchCallback, Arc<Mutex<Vec<WatchEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let callback: WatchCallback = Arc::new(move |event| sink.lock().push(event));
        (callback, events)
    }

    // Rename so the poller never sees a truncated file.
    fn write_atomic(path: &Path, data: &str) {
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, data).unwrap();
        std::fs::rename(&tmp, path).unwrap();
    }

    async fn wait_for_events(events: &Mutex<Vec<WatchEvent>>, count: usize) {
        for _ in 0..200 {
            if events.lock().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {} events, got {}", count, events.lock().len());
    }

    #[tokio::test]
    async fn test_initial_and_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranges.json");
        std::fs::write(&path, "v1").unwrap();

        let (callback, events) = recorder();
        let watch = FileWatch::new(Duration::from_millis(10));
        let _sub = watch
            .subscribe(path.to_str().unwrap(), callback)
            .await
            .unwrap();

        assert_eq!(events.lock().len(), 1);
        assert_eq!(events.lock()[0].metadata.kind, ChangeKind::Initial);

        write_atomic(&path, "v2");
        wait_for_events(&events, 2).await;

        let events = events.lock();
        assert_eq!(events[1].metadata.kind, ChangeKind::Changed);
        assert_eq!(events[1].metadata.version, 2);
        assert_eq!(events[1].payload.as_deref(), Some(&b"v2"[..]));
    }

    #[tokio::test]
    async fn test_unchanged_file_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranges.json");
        std::fs::write(&path, "v1").unwrap();

        let (callback, events) = recorder();
        let _sub = FileWatch::new(Duration::from_millis(5))
            .subscribe(path.to_str().unwrap(), callback)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(events.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_then_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranges.json");

        let (callback, events) = recorder();
        let _sub = FileWatch::new(Duration::from_millis(10))
            .subscribe(path.to_str().unwrap(), callback)
            .await
            .unwrap();
        assert!(events.lock()[0].payload.is_none());

        write_atomic(&path, "v1");
        wait_for_events(&events, 2).await;
        assert_eq!(events.lock()[1].payload.as_deref(), Some(&b"v1"[..]));
    }

    #[tokio::test]
    async fn test_missing_directory_rejected() {
        let (callback, _) = recorder();
        let result = FileWatch::default()
            .subscribe("/nonexistent-redshard-dir/ranges.json", callback)
            .await;
        assert!(matches!(result, Err(WatchError::Io { .. })));
    }

    #[test]
    fn test_read_failure_then_recovery_redelivers() {
        let (callback, events) = recorder();
        let mut poller = Poller {
            path: "ranges.json".to_string(),
            callback,
            version: 1,
            last: Some(Bytes::from_static(b"v1")),
            connected: true,
        };

        poller.observe(Read::Failed(std::io::Error::new(ErrorKind::Other, "io")));
        poller.observe(Read::Failed(std::io::Error::new(ErrorKind::Other, "io")));
        assert!(events.lock().is_empty());

        poller.observe(Read::Data(Bytes::from_static(b"v1")));
        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metadata.kind, ChangeKind::Reconnected);
        assert_eq!(events[0].metadata.version, 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_polling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ranges.json");
        std::fs::write(&path, "v1").unwrap();

        let (callback, events) = recorder();
        let sub = FileWatch::new(Duration::from_millis(5))
            .subscribe(path.to_str().unwrap(), callback)
            .await
            .unwrap();
        sub.cancel();

        write_atomic(&path, "v2");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(events.lock().len(), 1);
    }
}
