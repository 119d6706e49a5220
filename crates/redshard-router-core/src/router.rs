//! Shard router - atomically swappable range table.

use std::collections::BTreeSet;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tracing::{debug, info};

use redshard_types::{Endpoint, ShardRange};

use crate::table::RangeTable;

/// One published routing generation.
#[derive(Debug)]
pub struct RoutingSnapshot {
    generation: u64,
    table: RangeTable,
}

impl RoutingSnapshot {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn table(&self) -> &RangeTable {
        &self.table
    }
}

/// Outcome of a successful [`ShardRouter::reconfigure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    /// Generation number of the newly active table
    pub generation: u64,
    /// Every endpoint the new table references
    pub live_endpoints: BTreeSet<Endpoint>,
    /// Endpoints referenced by the previous table but not the new one
    pub retired_endpoints: BTreeSet<Endpoint>,
}

/// Routes keys to endpoints through the currently published [`RangeTable`].
///
/// Lookups load the active snapshot with a single atomic read and never
/// block. Reconfiguration builds nothing under the lock: the candidate is
/// already validated, and the lock only orders concurrent publishers.
pub struct ShardRouter {
    active: ArcSwapOption<RoutingSnapshot>,
    publish_lock: Mutex<()>,
}

impl ShardRouter {
    /// Create a router with no table; every lookup misses until the first publish.
    pub fn new() -> Self {
        Self {
            active: ArcSwapOption::empty(),
            publish_lock: Mutex::new(()),
        }
    }

    /// Create a router with an initial table already published.
    pub fn with_table(table: RangeTable) -> Self {
        let router = Self::new();
        router.reconfigure(table);
        router
    }

    /// Endpoint owning `key`, or `None` before the first range, after the
    /// last, inside a gap, or before any table is published.
    pub fn lookup(&self, key: i64) -> Option<Endpoint> {
        let guard = self.active.load();
        let snapshot = guard.as_deref()?;
        snapshot.table.lookup(key).map(|r| r.endpoint().clone())
    }

    /// Full range owning `key`.
    pub fn route(&self, key: i64) -> Option<ShardRange> {
        let guard = self.active.load();
        let snapshot = guard.as_deref()?;
        snapshot.table.lookup(key).cloned()
    }

    /// Capture the active generation for a consistent multi-step read.
    pub fn snapshot(&self) -> Option<Arc<RoutingSnapshot>> {
        self.active.load_full()
    }

    pub fn current_table(&self) -> Option<RangeTable> {
        self.snapshot().map(|s| s.table.clone())
    }

    /// Ranges of the active table in ascending order (empty if none).
    pub fn list_ranges(&self) -> Vec<ShardRange> {
        self.active
            .load()
            .as_deref()
            .map(|s| s.table.ranges().to_vec())
            .unwrap_or_default()
    }

    /// Active generation, 0 before the first publish.
    pub fn generation(&self) -> u64 {
        self.active.load().as_deref().map_or(0, |s| s.generation)
    }

    pub fn is_ready(&self) -> bool {
        self.active.load().is_some()
    }

    /// Publish `candidate` as the active table.
    ///
    /// Lookups that already loaded the previous snapshot finish against it;
    /// every lookup starting after this returns sees `candidate` or newer.
    pub fn reconfigure(&self, candidate: RangeTable) -> Publication {
        let live_endpoints = candidate.endpoints();
        let ranges = candidate.len();

        let (generation, previous) = {
            let _publish = self.publish_lock.lock();
            let generation = self.generation() + 1;
            let previous = self.active.swap(Some(Arc::new(RoutingSnapshot {
                generation,
                table: candidate,
            })));
            (generation, previous)
        };

        let retired_endpoints: BTreeSet<Endpoint> = previous
            .map(|p| p.table.endpoints())
            .unwrap_or_default()
            .difference(&live_endpoints)
            .cloned()
            .collect();

        info!(
            generation,
            ranges,
            endpoints = live_endpoints.len(),
            retired = retired_endpoints.len(),
            "Published range table"
        );
        for endpoint in &retired_endpoints {
            debug!(endpoint = %endpoint, generation, "Endpoint no longer routed");
        }

        Publication {
            generation,
            live_endpoints,
            retired_endpoints,
        }
    }
}

impl Default for ShardRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redshard_types::RangeDescriptor;

    fn table(entries: &[(i64, i64, &str)]) -> RangeTable {
        RangeTable::build(
            entries
                .iter()
                .map(|&(start, end, host)| RangeDescriptor::new(start, end, host)),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_router() {
        let router = ShardRouter::new();

        assert!(!router.is_ready());
        assert_eq!(router.generation(), 0);
        assert!(router.lookup(0).is_none());
        assert!(router.list_ranges().is_empty());
        assert!(router.snapshot().is_none());
    }

    #[test]
    fn test_lookup_after_publish() {
        let router = ShardRouter::with_table(table(&[
            (0, 100, "a:1:2"),
            (100, 200, "b:3:4"),
            (200, 300, "c:5:6"),
        ]));

        assert_eq!(router.generation(), 1);
        assert_eq!(router.lookup(150).unwrap().as_str(), "3:4");
        assert_eq!(router.lookup(99).unwrap().as_str(), "1:2");
        assert!(router.lookup(300).is_none());
        assert!(router.lookup(-1).is_none());
        assert_eq!(router.route(250).unwrap().host(), "c:5:6");
    }

    #[test]
    fn test_reconfigure_reports_retired_endpoints() {
        let router = ShardRouter::new();

        let first = router.reconfigure(table(&[(0, 100, "a:1:2"), (100, 200, "b:3:4")]));
        assert_eq!(first.generation, 1);
        assert!(first.retired_endpoints.is_empty());
        assert_eq!(first.live_endpoints.len(), 2);

        let second = router.reconfigure(table(&[(0, 200, "b:3:4"), (200, 300, "c:5:6")]));
        assert_eq!(second.generation, 2);
        assert_eq!(
            second.retired_endpoints.into_iter().collect::<Vec<_>>(),
            vec![Endpoint::new("1:2")]
        );
        assert!(second.live_endpoints.contains("5:6"));
    }

    #[test]
    fn test_new_lookups_observe_new_table() {
        let router = ShardRouter::with_table(table(&[(0, 100, "a:1:2")]));
        router.reconfigure(table(&[(0, 100, "b:3:4")]));

        assert_eq!(router.lookup(50).unwrap().as_str(), "3:4");
    }

    #[test]
    fn test_captured_snapshot_outlives_swap() {
        let router = ShardRouter::with_table(table(&[(0, 100, "a:1:2")]));
        let old = router.snapshot().unwrap();

        router.reconfigure(table(&[(0, 100, "b:3:4")]));

        assert_eq!(old.generation(), 1);
        assert_eq!(old.table().lookup(50).unwrap().host(), "a:1:2");
        assert_eq!(router.snapshot().unwrap().generation(), 2);
    }

    #[test]
    fn test_list_ranges_is_ordered() {
        let router = ShardRouter::with_table(table(&[(100, 200, "b:3:4"), (0, 100, "a:1:2")]));

        let json = serde_json::to_value(router.list_ranges()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"start": 0, "end": 100, "host": "a:1:2"},
                {"start": 100, "end": 200, "host": "b:3:4"},
            ])
        );
    }
}
