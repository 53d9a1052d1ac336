//! Schedule block persistence
//!
//! Schedules are divided into discrete, contiguous blocks of regular
//! duration. Blocks may be empty, partially or fully populated; an entry
//! overlapping a block boundary is written into each block it touches.
//! Writing a schedule runs the block merge, flags superseded broadcasts
//! inactive in the content store, persists the re-tiled blocks, and emits a
//! schedule update message for downstream consumers.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use sqlx::{Row, SqlitePool};
use tracing::info;

use airtime_common::messages::ScheduleUpdateMessage;
use airtime_common::model::{
    ChannelScheduleBlock, Content, Id, Item, ItemAndBroadcast, ScheduleRef, ScheduleUpdate, Source,
};
use airtime_common::time::block_starts;
use airtime_common::Interval;

use crate::equiv::{ContentResolver, ContentStore};
use crate::messaging::MessageSender;
use crate::schedule::block_updater::{update_blocks, ScheduleBlocksUpdate};
use crate::{Error, Result};

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Write one source's schedule for `channel` over `interval`. Returns
    /// the merge result, including what became stale.
    async fn write_schedule(
        &self,
        source: &Source,
        channel: Id,
        interval: Interval,
        entries: Vec<ItemAndBroadcast>,
    ) -> Result<ScheduleBlocksUpdate>;

    /// All blocks overlapped by `interval`, fully populated; absent blocks
    /// come back empty.
    async fn resolve_schedule_blocks(
        &self,
        source: &Source,
        channel: Id,
        interval: Interval,
    ) -> Result<Vec<ChannelScheduleBlock>>;
}

/// SQLite-backed [`ScheduleStore`]. One row per (source, channel, block
/// start); only the current tiling is retained, so there are no past blocks
/// to rescue from.
pub struct SqliteScheduleStore {
    pool: SqlitePool,
    content_resolver: Arc<dyn ContentResolver>,
    content_store: Arc<dyn ContentStore>,
    sender: Arc<dyn MessageSender<ScheduleUpdateMessage>>,
    block_length: Duration,
    content_update_timeout: std::time::Duration,
}

impl SqliteScheduleStore {
    pub fn new(
        pool: SqlitePool,
        content_resolver: Arc<dyn ContentResolver>,
        content_store: Arc<dyn ContentStore>,
        sender: Arc<dyn MessageSender<ScheduleUpdateMessage>>,
        block_length: Duration,
        content_update_timeout: std::time::Duration,
    ) -> Self {
        Self {
            pool,
            content_resolver,
            content_store,
            sender,
            block_length,
            content_update_timeout,
        }
    }

    async fn load_block(
        &self,
        source: &Source,
        channel: Id,
        block_interval: Interval,
    ) -> Result<ChannelScheduleBlock> {
        let row = sqlx::query(
            "SELECT data FROM schedule_block WHERE source = ? AND channel = ? AND block_start = ?",
        )
        .bind(source.key())
        .bind(channel.to_string())
        .bind(block_interval.start())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let data: String = row.get("data");
                Ok(serde_json::from_str(&data)?)
            }
            None => Ok(ChannelScheduleBlock::empty(channel, block_interval)),
        }
    }

    async fn store_blocks(&self, source: &Source, blocks: &[ChannelScheduleBlock]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for block in blocks {
            let data = serde_json::to_string(block)?;
            sqlx::query(
                "INSERT INTO schedule_block (source, channel, block_start, data, updated_at)
                 VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
                 ON CONFLICT(source, channel, block_start) DO UPDATE SET
                     data = excluded.data,
                     updated_at = CURRENT_TIMESTAMP",
            )
            .bind(source.key())
            .bind(block.channel.to_string())
            .bind(block.interval.start())
            .bind(&data)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Flag the superseded broadcast inactive on its item's stored content.
    /// The item is flagged in place, never deleted.
    async fn deactivate_stale_broadcast(&self, entry: &ItemAndBroadcast) -> Result<()> {
        let ids = [entry.item.id];
        let resolve = self.content_resolver.resolve_ids(&ids);
        let resolved = tokio::time::timeout(self.content_update_timeout, resolve)
            .await
            .map_err(|_| Error::Timeout(self.content_update_timeout, "stale content resolve".into()))??;

        let Some(content) = resolved.get(&entry.item.id) else {
            // Nothing stored for this item, nothing to flag.
            return Ok(());
        };
        let updated = deactivate_broadcast(content.clone(), &entry.item, &entry.broadcast.source_id);
        self.content_store.write_content(&updated).await
    }

    /// Persist the items of a schedule write, merging each entry's broadcast
    /// into the item's stored broadcast history rather than replacing it.
    async fn write_content_snapshots(&self, entries: &[ItemAndBroadcast]) -> Result<()> {
        let ids: Vec<Id> = {
            let mut ids: Vec<Id> = entries.iter().map(|e| e.item.id).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };
        let stored = self.content_resolver.resolve_ids(&ids).await?;

        let mut snapshots: std::collections::BTreeMap<Id, Item> = std::collections::BTreeMap::new();
        for entry in entries {
            let snapshot = snapshots.entry(entry.item.id).or_insert_with(|| {
                let mut item = entry.item.clone();
                // Previously stored broadcasts stay in the item's history.
                if let Some(existing) = stored.get(&entry.item.id).and_then(|c| c.item()) {
                    item.broadcasts = existing.broadcasts.clone();
                }
                item
            });
            snapshot
                .broadcasts
                .retain(|b| !b.same_identity(&entry.broadcast));
            snapshot.broadcasts.push(entry.broadcast.clone());
        }
        for snapshot in snapshots.into_values() {
            self.content_store.write_content(&Content::from(snapshot)).await?;
        }
        Ok(())
    }

    /// Each stored entry carries only its own broadcast, so the same item
    /// repeated across slots does not duplicate its full broadcast list.
    fn trim_broadcasts(blocks: Vec<ChannelScheduleBlock>) -> Vec<ChannelScheduleBlock> {
        blocks
            .into_iter()
            .map(|block| {
                let entries: Vec<_> = block
                    .entries()
                    .iter()
                    .map(|e| {
                        ItemAndBroadcast::new(
                            e.item.with_single_broadcast(e.broadcast.clone()),
                            e.broadcast.clone(),
                        )
                    })
                    .collect();
                block.with_entries(entries)
            })
            .collect()
    }
}

#[async_trait]
impl ScheduleStore for SqliteScheduleStore {
    async fn write_schedule(
        &self,
        source: &Source,
        channel: Id,
        interval: Interval,
        entries: Vec<ItemAndBroadcast>,
    ) -> Result<ScheduleBlocksUpdate> {
        if entries.is_empty() {
            return Ok(ScheduleBlocksUpdate::default());
        }
        if entries.iter().any(|e| e.broadcast.source_id.is_empty()) {
            return Err(Error::InvalidInput("all broadcasts must have ids".into()));
        }
        if let Some(entry) = entries.iter().find(|e| &e.item.source != source) {
            return Err(Error::InvalidInput(format!(
                "content must be from a single source; found {}",
                entry.item.source
            )));
        }

        self.write_content_snapshots(&entries).await?;

        let current_blocks = self.resolve_schedule_blocks(source, channel, interval).await?;
        let update = update_blocks(&current_blocks, &[], &entries, channel, interval);

        info!(
            source = %source,
            channel = %channel,
            %interval,
            updated = entries.len(),
            stale_entries = update.stale_entries.len(),
            stale_content = update.stale_content.len(),
            "processing schedule update"
        );

        for stale in update.stale_entries.iter().chain(update.stale_content.iter()) {
            self.deactivate_stale_broadcast(stale).await?;
        }

        self.store_blocks(source, &Self::trim_broadcasts(update.updated_blocks.clone()))
            .await?;

        let mut schedule_ref = ScheduleRef::new(channel, interval);
        for entry in &entries {
            schedule_ref = schedule_ref.with_entry(entry.item.id, entry.broadcast.to_ref());
        }
        let mut stale_refs = Vec::new();
        for stale in &update.stale_entries {
            let broadcast_ref = stale.broadcast.to_ref();
            if !stale_refs.contains(&broadcast_ref) {
                stale_refs.push(broadcast_ref);
            }
        }
        let message = ScheduleUpdateMessage::new(ScheduleUpdate {
            source: source.clone(),
            schedule: schedule_ref,
            stale_broadcasts: stale_refs,
        });
        // A schedule write that downstream consumers never hear about is a
        // failed write.
        self.sender
            .send(message)
            .await
            .map_err(|e| Error::Write(format!("sending schedule update message: {e}")))?;

        Ok(update)
    }

    async fn resolve_schedule_blocks(
        &self,
        source: &Source,
        channel: Id,
        interval: Interval,
    ) -> Result<Vec<ChannelScheduleBlock>> {
        let mut blocks = Vec::new();
        for start in block_starts(&interval, self.block_length) {
            let block_interval = Interval::new(start, start + self.block_length);
            blocks.push(self.load_block(source, channel, block_interval).await?);
        }
        Ok(blocks)
    }
}

/// Clear the actively-published flag on the matching broadcast of the
/// stored content, falling back to the in-update item snapshot when the
/// stored content is not an item kind.
fn deactivate_broadcast(content: Content, fallback: &Item, source_id: &str) -> Content {
    fn flag(mut item: Item, source_id: &str) -> Item {
        for broadcast in &mut item.broadcasts {
            if broadcast.source_id == source_id {
                broadcast.actively_published = false;
            }
        }
        item
    }

    match content {
        Content::Item(item) => Content::Item(flag(item, source_id)),
        Content::Episode(mut episode) => {
            episode.item = flag(episode.item, source_id);
            Content::Episode(episode)
        }
        Content::Brand(_) | Content::Series(_) => {
            Content::Item(flag(fallback.clone(), source_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airtime_common::model::Broadcast;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_deactivate_broadcast_flags_only_matching_id() {
        let channel = Id::random();
        let interval = Interval::new(
            Utc.timestamp_opt(0, 0).unwrap(),
            Utc.timestamp_opt(3600, 0).unwrap(),
        );
        let mut item = Item::new(Id::random(), Source::new("src"), "title");
        item.broadcasts = vec![
            Broadcast::new(channel, interval, "keep"),
            Broadcast::new(channel, interval, "drop"),
        ];

        let updated = deactivate_broadcast(Content::Item(item.clone()), &item, "drop");
        let updated = updated.into_item().unwrap();
        assert!(updated.broadcasts[0].actively_published);
        assert!(!updated.broadcasts[1].actively_published);
    }
}
