//! Range table - validated, sorted partition of the key space.

use std::collections::BTreeSet;

use redshard_types::{parse_payload, Endpoint, RangeDescriptor, ShardRange, ValidationError};

/// Immutable, validated set of shard ranges sorted by `start`.
///
/// Invariants, established by [`RangeTable::build`] and never relaxed:
/// - at least one range;
/// - `start < end` for every range;
/// - strictly ascending `start`, and `end[i] <= start[i + 1]`.
///
/// Gaps between ranges are allowed; a key inside a gap has no shard.
/// Equality is structural over `(start, end, host)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTable {
    ranges: Vec<ShardRange>,
}

impl RangeTable {
    /// Validate unordered descriptors into a table.
    ///
    /// Pure: no pools or routers are touched. The first violation rejects
    /// the whole table.
    pub fn build(
        descriptors: impl IntoIterator<Item = RangeDescriptor>,
    ) -> Result<Self, ValidationError> {
        let mut ranges = descriptors
            .into_iter()
            .map(|d| ShardRange::new(d.start, d.end, d.host))
            .collect::<Result<Vec<_>, _>>()?;

        if ranges.is_empty() {
            return Err(ValidationError::EmptyTable);
        }

        ranges.sort_by_key(ShardRange::start);

        // Equal starts land here too, since every range is non-empty.
        if let Some(pair) = ranges
            .windows(2)
            .find(|pair| pair[0].end() > pair[1].start())
        {
            return Err(ValidationError::OverlappingRanges {
                first_start: pair[0].start(),
                first_end: pair[0].end(),
                second_start: pair[1].start(),
                second_end: pair[1].end(),
            });
        }

        Ok(Self { ranges })
    }

    /// Decode a config payload and validate it.
    pub fn from_payload(payload: &[u8]) -> Result<Self, ValidationError> {
        Self::build(parse_payload(payload)?)
    }

    /// Find the range containing `key`, in O(log n).
    pub fn lookup(&self, key: i64) -> Option<&ShardRange> {
        // Index of the first range starting after `key`; the candidate is
        // the one just before it.
        let idx = self.ranges.partition_point(|r| r.start() <= key);
        let candidate = self.ranges.get(idx.checked_sub(1)?)?;
        candidate.contains(key).then_some(candidate)
    }

    /// Ranges in ascending order.
    pub fn ranges(&self) -> &[ShardRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Always false for a built table; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Distinct endpoints referenced by this table.
    pub fn endpoints(&self) -> BTreeSet<Endpoint> {
        self.ranges.iter().map(|r| r.endpoint().clone()).collect()
    }

    /// Total number of keys covered, excluding gaps.
    pub fn covered_keys(&self) -> u128 {
        self.ranges.iter().map(|r| u128::from(r.width())).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptors(entries: &[(i64, i64, &str)]) -> Vec<RangeDescriptor> {
        entries
            .iter()
            .map(|&(start, end, host)| RangeDescriptor::new(start, end, host))
            .collect()
    }

    fn scenario_a() -> RangeTable {
        RangeTable::build(descriptors(&[
            (0, 100, "a:1:2"),
            (100, 200, "b:3:4"),
            (200, 300, "c:5:6"),
        ]))
        .unwrap()
    }

    #[test]
    fn test_lookup_scenario_a() {
        let table = scenario_a();

        assert_eq!(table.lookup(150).unwrap().endpoint().as_str(), "3:4");
        assert_eq!(table.lookup(99).unwrap().endpoint().as_str(), "1:2");
        assert_eq!(table.lookup(0).unwrap().endpoint().as_str(), "1:2");
        assert_eq!(table.lookup(299).unwrap().endpoint().as_str(), "5:6");
        assert!(table.lookup(300).is_none());
        assert!(table.lookup(-1).is_none());
    }

    #[test]
    fn test_build_sorts_input() {
        let table = RangeTable::build(descriptors(&[
            (200, 300, "c:5:6"),
            (0, 100, "a:1:2"),
            (100, 200, "b:3:4"),
        ]))
        .unwrap();

        let starts: Vec<i64> = table.ranges().iter().map(ShardRange::start).collect();
        assert_eq!(starts, vec![0, 100, 200]);
        assert_eq!(table, scenario_a());
    }

    #[test]
    fn test_gap_is_a_miss() {
        let table =
            RangeTable::build(descriptors(&[(0, 10, "a:1:2"), (20, 30, "b:3:4")])).unwrap();

        assert!(table.lookup(9).is_some());
        assert!(table.lookup(10).is_none());
        assert!(table.lookup(15).is_none());
        assert!(table.lookup(19).is_none());
        assert!(table.lookup(20).is_some());
        assert_eq!(table.covered_keys(), 20);
    }

    #[test]
    fn test_overlap_rejected_scenario_b() {
        let err = RangeTable::build(descriptors(&[(0, 100, "a:1:2"), (50, 150, "b:3:4")]))
            .unwrap_err();

        assert_eq!(
            err,
            ValidationError::OverlappingRanges {
                first_start: 0,
                first_end: 100,
                second_start: 50,
                second_end: 150,
            }
        );
    }

    #[test]
    fn test_duplicate_start_rejected() {
        let err = RangeTable::build(descriptors(&[(0, 10, "a:1:2"), (0, 5, "b:3:4")]))
            .unwrap_err();
        assert_eq!(err.kind(), "overlapping_ranges");
    }

    #[test]
    fn test_non_monotonic_rejected() {
        let err = RangeTable::build(descriptors(&[(0, 100, "a:1:2"), (150, 150, "b:3:4")]))
            .unwrap_err();
        assert_eq!(err.kind(), "non_monotonic_boundaries");
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(
            RangeTable::build(Vec::new()).unwrap_err(),
            ValidationError::EmptyTable
        );
        assert_eq!(
            RangeTable::from_payload(b"[]").unwrap_err(),
            ValidationError::EmptyTable
        );
    }

    #[test]
    fn test_malformed_host_rejected() {
        let err = RangeTable::build(descriptors(&[(0, 100, "1:2")])).unwrap_err();
        assert_eq!(err.kind(), "malformed_payload");
    }

    #[test]
    fn test_endpoints_deduplicated() {
        let table = RangeTable::build(descriptors(&[
            (0, 10, "a:1:2"),
            (10, 20, "a2:1:2"),
            (20, 30, "b:3:4"),
        ]))
        .unwrap();

        let endpoints: Vec<String> = table.endpoints().iter().map(|e| e.to_string()).collect();
        assert_eq!(endpoints, vec!["1:2", "3:4"]);
    }

    #[test]
    fn test_from_payload() {
        let payload = br#"[{"start": 100, "end": 200, "host": "b:3:4"}, [0, 100, "a:1:2"]]"#;
        let table = RangeTable::from_payload(payload).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.ranges()[0].host(), "a:1:2");
    }

    #[test]
    fn test_extreme_keys() {
        let table = RangeTable::build(descriptors(&[
            (i64::MIN, 0, "neg:1:2"),
            (0, i64::MAX, "pos:3:4"),
        ]))
        .unwrap();

        assert_eq!(table.lookup(i64::MIN).unwrap().host(), "neg:1:2");
        assert_eq!(table.lookup(-1).unwrap().host(), "neg:1:2");
        assert_eq!(table.lookup(0).unwrap().host(), "pos:3:4");
        // `end` is exclusive, so the maximum key itself is unrouted.
        assert!(table.lookup(i64::MAX).is_none());
    }
}
