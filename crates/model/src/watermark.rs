use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Millisecond-precision UTC rendering used for timestamp watermarks. The
/// fixed width keeps lexicographic and chronological order identical.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// String-encoded scalar bounding the next incremental extraction query.
///
/// The empty watermark means "from the beginning": a full-mode mapping, a
/// mapping that has never synced, or one reset with `--force`. Per mapping the
/// watermark is monotone non-decreasing across successful runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(String);

impl Watermark {
    pub fn empty() -> Self {
        Watermark(String::new())
    }

    pub fn new(value: impl Into<String>) -> Self {
        Watermark(value.into())
    }

    pub fn from_timestamp(ts: DateTime<Utc>) -> Self {
        Watermark(ts.format(TIMESTAMP_FORMAT).to_string())
    }

    /// Byte-offset watermark used by log-file sources.
    pub fn from_offset(offset: u64) -> Self {
        Watermark(offset.to_string())
    }

    /// Encodes a JSON field value as a watermark scalar. Numbers keep their
    /// canonical decimal form, strings are taken verbatim; other shapes do
    /// not order meaningfully and yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Watermark(n.to_string())),
            Value::String(s) => Some(Watermark(s.clone())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_offset(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    /// Total order over encoded scalars: integer comparison when both sides
    /// parse as integers (primary-key watermarks), lexicographic otherwise
    /// (fixed-width RFC 3339 timestamps sort correctly as text). The empty
    /// watermark orders before everything.
    pub fn scalar_cmp(&self, other: &Watermark) -> Ordering {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }
        match (self.0.parse::<i128>(), other.0.parse::<i128>()) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            _ => self.0.cmp(&other.0),
        }
    }

    /// The greater of the two scalars.
    pub fn max(self, other: Watermark) -> Watermark {
        if self.scalar_cmp(&other) == Ordering::Less {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
