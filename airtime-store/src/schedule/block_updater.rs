//! Schedule block merging
//!
//! Merges a set of new (item, broadcast) pairs for a channel and interval
//! into the existing fixed-size time blocks, reporting what became stale in
//! the process. Broadcast identity is (channel, publisher broadcast id),
//! never interval equality: a broadcast that moves keeps its identity, a
//! slot re-occupied under a new broadcast id supersedes the old entry.

use std::collections::{BTreeSet, HashMap, HashSet};

use airtime_common::model::{Broadcast, Id, ItemAndBroadcast};
use airtime_common::Interval;

use airtime_common::model::ChannelScheduleBlock;

/// The result of merging one update into a channel's blocks.
///
/// `stale_entries` are superseded (item, broadcast) pairings; their
/// broadcasts should stop being actively published. `stale_content` are
/// items whose broadcast slot is now occupied by a different item.
#[derive(Debug, Clone, Default)]
pub struct ScheduleBlocksUpdate {
    pub updated_blocks: Vec<ChannelScheduleBlock>,
    pub stale_entries: Vec<ItemAndBroadcast>,
    pub stale_content: Vec<ItemAndBroadcast>,
}

/// Merge `new_entries` into `current_blocks` for `channel` over
/// `update_interval`.
///
/// Each current block keeps its entries outside the update interval
/// untouched and gains every new entry whose broadcast intersects the
/// block; a broadcast spanning two adjacent blocks lands in both. Existing
/// entries inside the update interval whose broadcast id is not resubmitted
/// become stale entries. Existing entries whose broadcast id is resubmitted
/// against a different item become stale content.
///
/// `past_blocks` are scanned for staleness only, never re-tiled: a past
/// entry absent from every updated current block is stale, but one that
/// became current again is not.
pub fn update_blocks(
    current_blocks: &[ChannelScheduleBlock],
    past_blocks: &[ChannelScheduleBlock],
    new_entries: &[ItemAndBroadcast],
    channel: Id,
    update_interval: Interval,
) -> ScheduleBlocksUpdate {
    let update_ids: HashSet<&str> = new_entries
        .iter()
        .map(|e| e.broadcast.source_id.as_str())
        .collect();
    let update_index: HashMap<&str, Id> = new_entries
        .iter()
        .map(|e| (e.broadcast.source_id.as_str(), e.item.id))
        .collect();

    let mut stale_entries: Vec<ItemAndBroadcast> = Vec::new();
    let mut stale_content: Vec<ItemAndBroadcast> = Vec::new();
    let mut updated_blocks = Vec::with_capacity(current_blocks.len());
    let mut all_updated_entries: HashSet<EntryKey> = HashSet::new();

    for block in current_blocks {
        // Existing entries not covered by this update survive as they are.
        let passed_through = block
            .entries()
            .iter()
            .filter(|e| !in_update(&e.broadcast, channel, update_interval))
            .cloned();

        // New entries land in every block their broadcast intersects.
        let placed = new_entries
            .iter()
            .filter(|e| {
                e.broadcast.channel == channel && e.broadcast.interval.intersects(&block.interval)
            })
            .cloned();

        for entry in block.entries() {
            let source_id = entry.broadcast.source_id.as_str();
            if in_update(&entry.broadcast, channel, update_interval)
                && !update_ids.contains(source_id)
                && !contains_entry(&stale_entries, entry)
            {
                stale_entries.push(entry.clone());
            }
            // Same broadcast id, different occupant: the old item vacated
            // the slot.
            if update_index.get(source_id).is_some_and(|id| *id != entry.item.id)
                && !contains_entry(&stale_content, entry)
            {
                stale_content.push(entry.clone());
            }
        }

        let mut merged: Vec<ItemAndBroadcast> = Vec::new();
        let mut seen: BTreeSet<EntryKey> = BTreeSet::new();
        for entry in passed_through.chain(placed) {
            if seen.insert(EntryKey::of(&entry)) {
                merged.push(entry);
            }
        }
        all_updated_entries.extend(seen);
        updated_blocks.push(block.with_entries(merged));
    }

    // A broadcast that was stale can become current again; it must not be
    // reported stale or its actively-published flag would be cleared.
    for block in past_blocks {
        for entry in block.entries() {
            if !all_updated_entries.contains(&EntryKey::of(entry))
                && !contains_entry(&stale_entries, entry)
            {
                stale_entries.push(entry.clone());
            }
        }
    }

    ScheduleBlocksUpdate {
        updated_blocks,
        stale_entries,
        stale_content,
    }
}

fn in_update(broadcast: &Broadcast, channel: Id, update_interval: Interval) -> bool {
    broadcast.channel == channel && broadcast.interval.intersects(&update_interval)
}

fn contains_entry(entries: &[ItemAndBroadcast], entry: &ItemAndBroadcast) -> bool {
    entries.iter().any(|e| EntryKey::of(e) == EntryKey::of(entry))
}

/// Entry identity for staleness tracking: (item id, broadcast id, slot).
/// Repeats of the same item occupy distinct slots and are tracked
/// independently.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct EntryKey {
    item: Id,
    source_id: String,
    channel: Id,
    start: i64,
}

impl EntryKey {
    fn of(entry: &ItemAndBroadcast) -> Self {
        Self {
            item: entry.item.id,
            source_id: entry.broadcast.source_id.clone(),
            channel: entry.broadcast.channel,
            start: entry.broadcast.interval.start().timestamp_millis(),
        }
    }
}
