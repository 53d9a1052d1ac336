//! Equivalence-aware schedule read model

use serde::{Deserialize, Serialize};

use airtime_common::model::{Broadcast, Id, Item};
use airtime_common::Interval;

use crate::equiv::Equivalent;

/// One resolved slot: a broadcast plus the full equivalent content that
/// occupies it, already filtered to the caller's selected publishers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalentScheduleEntry {
    pub broadcast: Broadcast,
    pub items: Equivalent<Item>,
}

impl EquivalentScheduleEntry {
    pub fn new(broadcast: Broadcast, items: Equivalent<Item>) -> Self {
        Self { broadcast, items }
    }
}

/// The resolved schedule of one channel over the interval actually covered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalentChannelSchedule {
    pub channel: Id,
    pub interval: Interval,
    pub entries: Vec<EquivalentScheduleEntry>,
}

impl EquivalentChannelSchedule {
    pub fn new(channel: Id, interval: Interval, entries: Vec<EquivalentScheduleEntry>) -> Self {
        let mut entries = entries;
        entries.sort_by_key(|e| (e.broadcast.interval.start(), e.broadcast.source_id.clone()));
        Self { channel, interval, entries }
    }

    pub fn empty(channel: Id, interval: Interval) -> Self {
        Self { channel, interval, entries: Vec::new() }
    }

    /// Truncate to the first `count` broadcasts, narrowing the covered
    /// interval to the end of the last retained broadcast.
    pub fn with_limited_broadcasts(&self, count: usize) -> Self {
        if self.entries.len() <= count {
            return self.clone();
        }
        let entries: Vec<_> = self.entries.iter().take(count).cloned().collect();
        let end = entries
            .last()
            .map(|e| e.broadcast.interval.end())
            .unwrap_or_else(|| self.interval.start());
        Self {
            channel: self.channel,
            interval: Interval::new(self.interval.start(), end.max(self.interval.start())),
            entries,
        }
    }
}

/// The externally consumed read model: one resolved channel schedule per
/// requested channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalentSchedule {
    pub channels: Vec<EquivalentChannelSchedule>,
}

impl EquivalentSchedule {
    pub fn new(channels: Vec<EquivalentChannelSchedule>) -> Self {
        Self { channels }
    }

    pub fn channel(&self, channel: Id) -> Option<&EquivalentChannelSchedule> {
        self.channels.iter().find(|c| c.channel == channel)
    }

    /// Limit every channel's schedule to its first `count` broadcasts.
    pub fn with_limited_broadcasts(&self, count: usize) -> Self {
        Self {
            channels: self
                .channels
                .iter()
                .map(|c| c.with_limited_broadcasts(count))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airtime_common::model::{EquivalenceGraph, ResourceRef, Source};
    use chrono::{TimeZone, Utc};

    fn interval(start: i64, end: i64) -> Interval {
        Interval::new(
            Utc.timestamp_opt(start, 0).unwrap(),
            Utc.timestamp_opt(end, 0).unwrap(),
        )
    }

    fn slot(channel: Id, source_id: &str, start: i64, end: i64) -> EquivalentScheduleEntry {
        let item = Item::new(Id::random(), Source::new("src"), source_id);
        let graph =
            EquivalenceGraph::singleton(ResourceRef::new(item.id, item.source.clone()));
        EquivalentScheduleEntry::new(
            Broadcast::new(channel, interval(start, end), source_id),
            Equivalent::new(graph, vec![item]),
        )
    }

    #[test]
    fn test_limited_broadcasts_truncates_and_narrows_interval() {
        let channel = Id::random();
        let schedule = EquivalentChannelSchedule::new(
            channel,
            interval(0, 300),
            vec![
                slot(channel, "a", 0, 100),
                slot(channel, "b", 100, 200),
                slot(channel, "c", 200, 300),
            ],
        );

        let limited = schedule.with_limited_broadcasts(2);
        assert_eq!(limited.entries.len(), 2);
        assert_eq!(limited.interval, interval(0, 200));

        // fewer entries than the limit: unchanged
        assert_eq!(schedule.with_limited_broadcasts(5), schedule);
    }
}
