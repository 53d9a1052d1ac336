//! Half-open time intervals
//!
//! All schedule arithmetic works on `[start, end)` intervals. A degenerate
//! interval (`start == end`) still "touches" the instant at its start so a
//! point query against a schedule does not come back empty.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Interval {
    /// Create an interval. `end` must not precede `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(end >= start, "interval end precedes start");
        Self { start, end }
    }

    /// Interval starting at `start` with the given length.
    pub fn starting_at(start: DateTime<Utc>, length: Duration) -> Self {
        Self::new(start, start + length)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether an instant falls inside `[start, end)`. A degenerate interval
    /// contains exactly its own start.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        if self.is_empty() {
            return instant == self.start;
        }
        self.start <= instant && instant < self.end
    }

    /// Whether two intervals overlap. Degenerate intervals intersect anything
    /// that contains (or starts at) their instant, so a point query still
    /// selects the slot it touches.
    pub fn intersects(&self, other: &Interval) -> bool {
        if self.is_empty() {
            return other.contains(self.start) || other.start == self.start;
        }
        if other.is_empty() {
            return self.contains(other.start) || self.start == other.start;
        }
        self.start < other.end && other.start < self.end
    }

    /// Whether `other` lies entirely within this interval.
    pub fn encloses(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Enumerate the starts of the fixed-size blocks a schedule interval covers.
///
/// Blocks tile time contiguously from the Unix epoch. An empty interval still
/// yields the single block containing its instant.
pub fn block_starts(interval: &Interval, block_length: Duration) -> Vec<DateTime<Utc>> {
    assert!(block_length > Duration::zero(), "block length must be positive");
    let length = block_length.num_milliseconds();
    let first = interval.start().timestamp_millis().div_euclid(length) * length;
    // End instant itself is exclusive, unless the interval is empty.
    let last = if interval.is_empty() {
        first
    } else {
        (interval.end().timestamp_millis() - 1).div_euclid(length) * length
    };
    let mut starts = Vec::new();
    let mut at = first;
    while at <= last {
        starts.push(DateTime::from_timestamp_millis(at).expect("valid block start"));
        at += length;
    }
    starts
}
