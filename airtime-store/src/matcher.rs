//! Tolerant broadcast matching
//!
//! Different publishers report slightly different times for the same
//! transmission. The matcher treats two broadcasts on the same channel as
//! the same transmission when their start times fall within a flexibility
//! window; if an end flexibility is configured the end times must match
//! within it too, otherwise ends are ignored.

use airtime_common::model::Broadcast;
use chrono::Duration;

/// Symmetric, channel-scoped tolerant equality between broadcasts.
#[derive(Debug, Clone)]
pub struct BroadcastMatcher {
    start_flexibility: Duration,
    end_flexibility: Option<Duration>,
}

impl BroadcastMatcher {
    /// Match start times within `start_flexibility`; ignore end times.
    pub fn new(start_flexibility: Duration) -> Self {
        Self { start_flexibility, end_flexibility: None }
    }

    /// Match start times within `start_flexibility` and end times within
    /// `end_flexibility`.
    pub fn with_end_flexibility(start_flexibility: Duration, end_flexibility: Duration) -> Self {
        Self {
            start_flexibility,
            end_flexibility: Some(end_flexibility),
        }
    }

    /// Starts must be identical; ends are ignored.
    pub fn exact_start() -> Self {
        Self::new(Duration::zero())
    }

    /// Starts and ends must both be identical.
    pub fn exact_start_end() -> Self {
        Self::with_end_flexibility(Duration::zero(), Duration::zero())
    }

    /// Whether `a` and `b` are the same transmission. Symmetric; requires
    /// the same channel.
    pub fn matches(&self, a: &Broadcast, b: &Broadcast) -> bool {
        if a.channel != b.channel {
            return false;
        }
        let start_delta = (a.interval.start() - b.interval.start()).abs();
        if start_delta > self.start_flexibility {
            return false;
        }
        match self.end_flexibility {
            Some(flex) => (a.interval.end() - b.interval.end()).abs() <= flex,
            None => true,
        }
    }

    /// First candidate matching `subject`, if any.
    pub fn find_matching_broadcast<'a>(
        &self,
        subject: &Broadcast,
        candidates: impl IntoIterator<Item = &'a Broadcast>,
    ) -> Option<&'a Broadcast> {
        candidates.into_iter().find(|c| self.matches(subject, c))
    }
}
