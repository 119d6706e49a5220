//! Cross-module tests: lookup properties and concurrent reconfiguration.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{RangeDescriptor, RangeTable, ShardRouter, ValidationError};

/// Random valid table: ascending starts, random widths, random gaps.
fn random_table(rng: &mut StdRng, count: usize) -> RangeTable {
    let mut start: i64 = rng.gen_range(-10_000..10_000);
    let mut descriptors = Vec::with_capacity(count);
    for i in 0..count {
        let end = start + rng.gen_range(1..500);
        let host = format!("s{}:10.0.0.{}:6379", i, i % 7);
        descriptors.push(RangeDescriptor::new(start, end, host));
        start = end + rng.gen_range(0..3) * rng.gen_range(0..200);
    }
    // Shuffle so the builder has to sort.
    for i in (1..descriptors.len()).rev() {
        let j = rng.gen_range(0..=i);
        descriptors.swap(i, j);
    }
    RangeTable::build(descriptors).unwrap()
}

#[test]
fn test_lookup_matches_linear_scan() {
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..50 {
        let count = rng.gen_range(1..40);
        let table = random_table(&mut rng, count);
        let low = table.ranges()[0].start() - 50;
        let high = table.ranges()[table.len() - 1].end() + 50;

        for _ in 0..500 {
            let key = rng.gen_range(low..high);
            let containing: Vec<_> = table.ranges().iter().filter(|r| r.contains(key)).collect();
            assert!(containing.len() <= 1, "key {} in {} ranges", key, containing.len());
            assert_eq!(table.lookup(key), containing.first().copied(), "key {}", key);
        }
    }
}

#[test]
fn test_rejected_build_leaves_router_untouched() {
    let router = ShardRouter::with_table(
        RangeTable::build(vec![RangeDescriptor::new(0, 100, "a:1:2")]).unwrap(),
    );
    let before = router.current_table();

    let bad = RangeTable::build(vec![
        RangeDescriptor::new(0, 100, "a:1:2"),
        RangeDescriptor::new(50, 150, "b:3:4"),
    ]);
    assert!(matches!(bad, Err(ValidationError::OverlappingRanges { .. })));

    let bad = RangeTable::build(vec![RangeDescriptor::new(10, 5, "a:1:2")]);
    assert!(matches!(bad, Err(ValidationError::NonMonotonicBoundaries { .. })));

    assert_eq!(router.current_table(), before);
    assert_eq!(router.generation(), 1);
}

/// Readers racing a writer must only ever see a complete old or a complete
/// new table, never a mix.
#[test]
fn test_concurrent_lookups_see_whole_tables() {
    fn uniform(ranges: usize, label: &str, port: u16) -> RangeTable {
        RangeTable::build((0..ranges).map(|i| {
            let start = i as i64 * 10;
            RangeDescriptor::new(start, start + 10, format!("{}:10.0.0.1:{}", label, port))
        }))
        .unwrap()
    }

    let old = uniform(10, "old", 1000);
    let new = uniform(25, "new", 2000);
    let router = Arc::new(ShardRouter::with_table(old));
    let stop = Arc::new(AtomicBool::new(false));
    let observed = Arc::new(AtomicUsize::new(0));

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let router = router.clone();
            let stop = stop.clone();
            let observed = observed.clone();
            scope.spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let snapshot = router.snapshot().unwrap();
                    let table = snapshot.table();
                    let labels: Vec<&str> = table
                        .ranges()
                        .iter()
                        .map(|r| r.host().split(':').next().unwrap())
                        .collect();
                    match table.len() {
                        10 => assert!(labels.iter().all(|l| *l == "old")),
                        25 => assert!(labels.iter().all(|l| *l == "new")),
                        n => panic!("unexpected range count {}", n),
                    }

                    let endpoint = router.lookup(55).unwrap();
                    assert!(
                        endpoint.as_str() == "10.0.0.1:1000"
                            || endpoint.as_str() == "10.0.0.1:2000"
                    );
                    observed.fetch_add(1, Ordering::Relaxed);
                }
            });
        }

        for i in 0..200 {
            if i % 2 == 0 {
                router.reconfigure(new.clone());
            } else {
                router.reconfigure(uniform(10, "old", 1000));
            }
            std::thread::yield_now();
        }
        router.reconfigure(new.clone());
        while observed.load(Ordering::Relaxed) < 1_000 {
            std::thread::yield_now();
        }
        stop.store(true, Ordering::Relaxed);
    });

    assert!(observed.load(Ordering::Relaxed) >= 1_000);
    assert_eq!(router.generation(), 202);
    // Published last, so every later lookup sees it.
    assert_eq!(router.lookup(245).unwrap().as_str(), "10.0.0.1:2000");
}

#[test]
fn test_generations_are_sequential_under_contention() {
    let router = Arc::new(ShardRouter::new());
    let table = RangeTable::build(vec![RangeDescriptor::new(0, 1, "a:1:2")]).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let router = router.clone();
            let table = table.clone();
            scope.spawn(move || {
                for _ in 0..100 {
                    router.reconfigure(table.clone());
                }
            });
        }
    });

    assert_eq!(router.generation(), 800);
}
