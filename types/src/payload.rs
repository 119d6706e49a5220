//! Range config payload decoding
//!
//! The watched config node holds a JSON array of range descriptors. Each
//! entry is either an object or a 3-element array:
//!
//! ```text
//! [{"start": 0, "end": 100, "host": "a:10.0.0.1:6379"}, ...]
//! [[0, 100, "a:10.0.0.1:6379"], ...]
//! ```
//!
//! A single bad entry invalidates the whole payload.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One raw range entry, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawDescriptor")]
pub struct RangeDescriptor {
    pub start: i64,
    pub end: i64,
    pub host: String,
}

impl RangeDescriptor {
    pub fn new(start: i64, end: i64, host: impl Into<String>) -> Self {
        Self {
            start,
            end,
            host: host.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDescriptor {
    Object { start: i64, end: i64, host: String },
    Tuple(i64, i64, String),
}

impl From<RawDescriptor> for RangeDescriptor {
    fn from(raw: RawDescriptor) -> Self {
        match raw {
            RawDescriptor::Object { start, end, host } | RawDescriptor::Tuple(start, end, host) => {
                Self { start, end, host }
            }
        }
    }
}

/// Decode a payload into raw descriptors.
///
/// Only the shape is checked here; bounds, ordering and overlap are the
/// range table builder's job.
pub fn parse_payload(payload: &[u8]) -> Result<Vec<RangeDescriptor>, ValidationError> {
    serde_json::from_slice(payload).map_err(|e| ValidationError::MalformedPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_entries() {
        let payload = br#"[{"start": 0, "end": 100, "host": "a:1:2"},
                           {"start": 100, "end": 200, "host": "b:3:4"}]"#;
        let descriptors = parse_payload(payload).unwrap();
        assert_eq!(
            descriptors,
            vec![
                RangeDescriptor::new(0, 100, "a:1:2"),
                RangeDescriptor::new(100, 200, "b:3:4"),
            ]
        );
    }

    #[test]
    fn test_array_entries() {
        let descriptors = parse_payload(br#"[[-50, 0, "neg:1:2"], [0, 50, "pos:3:4"]]"#).unwrap();
        assert_eq!(descriptors[0], RangeDescriptor::new(-50, 0, "neg:1:2"));
        assert_eq!(descriptors[1], RangeDescriptor::new(0, 50, "pos:3:4"));
    }

    #[test]
    fn test_wrong_field_count() {
        let err = parse_payload(br#"[[0, 100]]"#).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedPayload(_)));

        let err = parse_payload(br#"[[0, 100, "a:1:2", "extra"]]"#).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedPayload(_)));
    }

    #[test]
    fn test_non_numeric_bounds() {
        let err = parse_payload(br#"[{"start": "0", "end": 100, "host": "a:1:2"}]"#).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedPayload(_)));

        let err = parse_payload(br#"[{"start": 0.5, "end": 100, "host": "a:1:2"}]"#).unwrap_err();
        assert!(matches!(err, ValidationError::MalformedPayload(_)));
    }

    #[test]
    fn test_missing_field_poisons_payload() {
        let payload = br#"[{"start": 0, "end": 100, "host": "a:1:2"},
                           {"start": 100, "host": "b:3:4"}]"#;
        assert!(parse_payload(payload).is_err());
    }

    #[test]
    fn test_not_json() {
        assert!(parse_payload(b"0,100,a:1:2").is_err());
    }

    #[test]
    fn test_empty_array_is_not_a_parse_error() {
        assert!(parse_payload(b"[]").unwrap().is_empty());
    }
}
