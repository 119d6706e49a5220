//! Range table validation errors

use thiserror::Error;

/// Reasons a candidate range table is rejected.
///
/// Validation failures are never fatal: the router keeps serving the last
/// table that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Payload could not be decoded, or an entry has a missing or wrong-typed field
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Payload decoded to zero ranges
    #[error("Range table is empty")]
    EmptyTable,

    /// An entry with `start >= end`
    #[error("Non-monotonic boundaries: start {start} >= end {end} (host {host})")]
    NonMonotonicBoundaries { start: i64, end: i64, host: String },

    /// Two ranges share at least one key
    #[error(
        "Overlapping ranges: [{first_start}, {first_end}) overlaps [{second_start}, {second_end})"
    )]
    OverlappingRanges {
        first_start: i64,
        first_end: i64,
        second_start: i64,
        second_end: i64,
    },
}

impl ValidationError {
    /// Short stable name for logs and counters
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::MalformedPayload(_) => "malformed_payload",
            ValidationError::EmptyTable => "empty_table",
            ValidationError::NonMonotonicBoundaries { .. } => "non_monotonic_boundaries",
            ValidationError::OverlappingRanges { .. } => "overlapping_ranges",
        }
    }
}
