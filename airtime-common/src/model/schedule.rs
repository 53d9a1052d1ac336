//! Schedule model: blocks, entries and update payloads

use serde::{Deserialize, Serialize};

use crate::time::Interval;

use super::{Broadcast, BroadcastRef, Id, Item, Source};

/// An item paired with the specific broadcast it was scheduled against.
///
/// The same item may appear several times in one schedule (repeats); each
/// pairing is tracked independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAndBroadcast {
    pub item: Item,
    pub broadcast: Broadcast,
}

impl ItemAndBroadcast {
    pub fn new(item: Item, broadcast: Broadcast) -> Self {
        Self { item, broadcast }
    }
}

/// A fixed time-bounded slice of one channel's schedule: the unit of
/// update and merge.
///
/// Entries are kept ordered by broadcast start. Blocks tile time
/// contiguously; a broadcast spanning two adjacent blocks appears in both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelScheduleBlock {
    pub channel: Id,
    pub interval: Interval,
    entries: Vec<ItemAndBroadcast>,
}

impl ChannelScheduleBlock {
    pub fn new(
        channel: Id,
        interval: Interval,
        entries: impl IntoIterator<Item = ItemAndBroadcast>,
    ) -> Self {
        let mut entries: Vec<_> = entries.into_iter().collect();
        sort_entries(&mut entries);
        Self { channel, interval, entries }
    }

    pub fn empty(channel: Id, interval: Interval) -> Self {
        Self { channel, interval, entries: Vec::new() }
    }

    pub fn entries(&self) -> &[ItemAndBroadcast] {
        &self.entries
    }

    /// Copy of this block with the given entries, re-sorted by broadcast
    /// start.
    pub fn with_entries(&self, entries: impl IntoIterator<Item = ItemAndBroadcast>) -> Self {
        Self::new(self.channel, self.interval, entries)
    }
}

fn sort_entries(entries: &mut [ItemAndBroadcast]) {
    entries.sort_by_key(|e| (e.broadcast.interval.start(), e.broadcast.source_id.clone()));
}

/// One entry of a schedule update: the scheduled item id and the broadcast
/// slot it occupies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRefEntry {
    pub item: Id,
    pub broadcast: BroadcastRef,
}

/// A publisher's view of one channel's schedule over an interval, as named
/// by an update message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRef {
    pub channel: Id,
    pub interval: Interval,
    pub entries: Vec<ScheduleRefEntry>,
}

impl ScheduleRef {
    pub fn new(channel: Id, interval: Interval) -> Self {
        Self { channel, interval, entries: Vec::new() }
    }

    pub fn with_entry(mut self, item: Id, broadcast: BroadcastRef) -> Self {
        self.entries.push(ScheduleRefEntry { item, broadcast });
        self
    }
}

/// A schedule write: the new state of a channel interval from one source,
/// plus broadcasts the source explicitly withdrew.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleUpdate {
    pub source: Source,
    pub schedule: ScheduleRef,
    pub stale_broadcasts: Vec<BroadcastRef>,
}
