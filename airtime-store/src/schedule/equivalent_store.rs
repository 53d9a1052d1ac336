//! Equivalent schedule orchestration
//!
//! Materializes "this broadcast, and everything equivalent to what it
//! transmits" as one row per (source, channel, block, broadcast). The three
//! writer entry points arrive on independent at-least-once streams with no
//! cross-stream ordering, so each one re-derives its effect from current
//! store state and is safe to replay in any order. Reads serve the
//! materialized rows, filtering to the caller's selected publishers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use airtime_common::model::{
    Broadcast, Content, EquivalenceGraph, EquivalenceGraphUpdate, Id, Item, ResourceRef,
    ScheduleUpdate, Source,
};
use airtime_common::time::block_starts;
use airtime_common::Interval;

use crate::equiv::{ContentResolver, EquivalenceGraphStore, Equivalent};
use crate::matcher::BroadcastMatcher;
use crate::observe::StoreMetrics;
use crate::schedule::equivalent::{
    EquivalentChannelSchedule, EquivalentSchedule, EquivalentScheduleEntry,
};
use crate::{Error, Result};

const CHANNEL_READ_RETRIES: u32 = 3;

#[async_trait]
pub trait EquivalentScheduleStore: Send + Sync {
    /// Resolve the merged schedule for `channels` over `interval` from
    /// `source`'s point of view, including equivalent content from
    /// `selected_sources`.
    async fn resolve_schedules(
        &self,
        channels: &[Id],
        interval: Interval,
        source: &Source,
        selected_sources: &BTreeSet<Source>,
    ) -> Result<EquivalentSchedule>;

    /// Resolve a fixed number of broadcasts forward from `start` per
    /// channel, looking no further ahead than the configured maximum
    /// schedule length.
    async fn resolve_schedules_count(
        &self,
        channels: &[Id],
        start: DateTime<Utc>,
        count: usize,
        source: &Source,
        selected_sources: &BTreeSet<Source>,
    ) -> Result<EquivalentSchedule>;

    /// Apply one schedule write: place the update's entries, delete rows
    /// the update superseded within its interval, and flag the update's
    /// stale broadcasts inactive without deleting them.
    async fn update_schedule(&self, update: &ScheduleUpdate) -> Result<()>;

    /// Refresh the equivalent-content view of every schedule entry touched
    /// by the update's ids. Graphs are re-resolved from the authoritative
    /// store; the update's embedded graphs are only a hint of what moved.
    async fn update_equivalences(&self, update: &EquivalenceGraphUpdate) -> Result<()>;

    /// Refresh stored content snapshots (title edits etc.) inside existing
    /// entries without touching broadcast placement.
    async fn update_content(&self, items: &[Item]) -> Result<()>;
}

/// SQLite-backed [`EquivalentScheduleStore`].
pub struct SqliteEquivalentScheduleStore {
    pool: SqlitePool,
    graphs: Arc<dyn EquivalenceGraphStore>,
    content: Arc<dyn ContentResolver>,
    matcher: BroadcastMatcher,
    metrics: Arc<StoreMetrics>,
    block_length: Duration,
    max_schedule_length: Duration,
    resolve_timeout: std::time::Duration,
    retry_base_delay: std::time::Duration,
}

impl SqliteEquivalentScheduleStore {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: SqlitePool,
        graphs: Arc<dyn EquivalenceGraphStore>,
        content: Arc<dyn ContentResolver>,
        matcher: BroadcastMatcher,
        metrics: Arc<StoreMetrics>,
        block_length: Duration,
        max_schedule_length: Duration,
        resolve_timeout: std::time::Duration,
        retry_base_delay: std::time::Duration,
    ) -> Self {
        Self {
            pool,
            graphs,
            content,
            matcher,
            metrics,
            block_length,
            max_schedule_length,
            resolve_timeout,
            retry_base_delay,
        }
    }

    async fn with_timeout<T>(
        &self,
        what: &str,
        fut: impl std::future::Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        tokio::time::timeout(self.resolve_timeout, fut)
            .await
            .map_err(|_| Error::Timeout(self.resolve_timeout, what.to_string()))?
    }

    /// Graphs for `ids` plus one batched content resolution across every
    /// graph member. The single batched call bounds fan-out no matter how
    /// many entries an update carries.
    async fn resolve_graphs_and_content(
        &self,
        ids: &[Id],
    ) -> Result<(BTreeMap<Id, EquivalenceGraph>, BTreeMap<Id, Content>)> {
        let graphs = self
            .with_timeout("graph resolve", self.graphs.resolve_ids(ids))
            .await?;
        let member_ids: Vec<Id> = {
            let mut all: BTreeSet<Id> = ids.iter().copied().collect();
            all.extend(graphs.values().flat_map(|g| g.equivalence_set()));
            all.into_iter().collect()
        };
        let content = self
            .with_timeout("content resolve", self.content.resolve_ids(&member_ids))
            .await?;
        Ok((graphs, content))
    }

    async fn read_channel(
        &self,
        source: &Source,
        channel: Id,
        interval: Interval,
        selected_sources: &BTreeSet<Source>,
    ) -> Result<EquivalentChannelSchedule> {
        let starts = block_starts(&interval, self.block_length);
        let mut qb = sqlx::QueryBuilder::new(
            "SELECT broadcast_id, broadcast, graph, content FROM equivalent_schedule
             WHERE active = 1 AND source = ",
        );
        qb.push_bind(source.key());
        qb.push(" AND channel = ");
        qb.push_bind(channel.to_string());
        qb.push(" AND block_start IN (");
        let mut sep = qb.separated(", ");
        for start in &starts {
            sep.push_bind(*start);
        }
        qb.push(") ORDER BY broadcast_start");
        let rows = qb.build().fetch_all(&self.pool).await?;

        let mut entries = Vec::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for row in rows {
            let broadcast_id: String = row.get("broadcast_id");
            // A broadcast spanning two blocks is stored once per block.
            if !seen.insert(broadcast_id) {
                continue;
            }
            let broadcast: Broadcast = serde_json::from_str(row.get("broadcast"))?;
            if !broadcast.interval.intersects(&interval) {
                continue;
            }
            let graph: EquivalenceGraph = serde_json::from_str(row.get("graph"))?;
            let items: Vec<Item> = serde_json::from_str(row.get("content"))?;
            entries.push(self.filter_entry(broadcast, graph, items, selected_sources));
        }
        Ok(EquivalentChannelSchedule::new(channel, interval, entries))
    }

    /// Reduce a materialized row to the caller's view: items from selected
    /// publishers whose broadcast correlates with the slot. Cross-source
    /// correlation goes through the matcher since publishers report
    /// slightly different times for the same transmission.
    fn filter_entry(
        &self,
        broadcast: Broadcast,
        graph: EquivalenceGraph,
        items: Vec<Item>,
        selected_sources: &BTreeSet<Source>,
    ) -> EquivalentScheduleEntry {
        let mut selected = Vec::new();
        for item in items {
            if !selected_sources.contains(&item.source) {
                continue;
            }
            let active: Vec<Broadcast> = item.active_broadcasts().cloned().collect();
            if let Some(matched) = self.matcher.find_matching_broadcast(&broadcast, &active) {
                selected.push(item.with_single_broadcast(matched.clone()));
            }
        }
        EquivalentScheduleEntry::new(broadcast, Equivalent::new(graph, selected))
    }

    async fn read_channel_with_retry(
        &self,
        source: &Source,
        channel: Id,
        interval: Interval,
        selected_sources: &BTreeSet<Source>,
    ) -> EquivalentChannelSchedule {
        let mut retry = 0;
        loop {
            match self
                .read_channel(source, channel, interval, selected_sources)
                .await
            {
                Ok(schedule) => return schedule,
                Err(e) => {
                    self.metrics.record_failure();
                    warn!(%channel, retry, error = %e, "channel schedule read failed");
                    if retry == CHANNEL_READ_RETRIES {
                        break;
                    }
                    retry += 1;
                    tokio::time::sleep(self.retry_base_delay * retry).await;
                }
            }
        }
        // One broken channel must not fail the whole request.
        EquivalentChannelSchedule::empty(channel, interval)
    }

    /// Rows currently stored for any of `item_ids`, as (rowid, item id,
    /// broadcast) triples.
    async fn rows_for_items(&self, item_ids: &[Id]) -> Result<Vec<(i64, Id, Broadcast)>> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = sqlx::QueryBuilder::new(
            "SELECT rowid, item_id, broadcast FROM equivalent_schedule WHERE item_id IN (",
        );
        let mut sep = qb.separated(", ");
        for id in item_ids {
            sep.push_bind(id.to_string());
        }
        qb.push(")");
        let rows = qb.build().fetch_all(&self.pool).await?;

        let mut out = Vec::new();
        for row in rows {
            let rowid: i64 = row.get("rowid");
            let item_id: String = row.get("item_id");
            let item_id = item_id
                .parse::<Id>()
                .map_err(|e| Error::InvalidInput(format!("stored item id: {e}")))?;
            let broadcast: Broadcast = serde_json::from_str(row.get("broadcast"))?;
            out.push((rowid, item_id, broadcast));
        }
        Ok(out)
    }

    fn equivalent_items(
        graph: &EquivalenceGraph,
        content: &BTreeMap<Id, Content>,
    ) -> Vec<Item> {
        graph
            .equivalence_set()
            .filter_map(|member| content.get(&member))
            .filter_map(|c| c.item().cloned())
            .collect()
    }

    fn graph_for(
        item_id: Id,
        graphs: &BTreeMap<Id, EquivalenceGraph>,
        content: &BTreeMap<Id, Content>,
    ) -> EquivalenceGraph {
        if let Some(graph) = graphs.get(&item_id) {
            return graph.clone();
        }
        let source = content
            .get(&item_id)
            .map(|c| c.source().clone())
            .unwrap_or_else(|| Source::new("unknown"));
        EquivalenceGraph::singleton(ResourceRef::new(item_id, source))
    }
}

#[async_trait]
impl EquivalentScheduleStore for SqliteEquivalentScheduleStore {
    async fn resolve_schedules(
        &self,
        channels: &[Id],
        interval: Interval,
        source: &Source,
        selected_sources: &BTreeSet<Source>,
    ) -> Result<EquivalentSchedule> {
        self.metrics.record_call();
        if interval.duration() > self.max_schedule_length {
            return Err(Error::InvalidInput(format!(
                "interval {interval} exceeds the maximum schedule length"
            )));
        }

        let reads = channels
            .iter()
            .map(|&channel| self.read_channel_with_retry(source, channel, interval, selected_sources));
        let resolved = join_all(reads).await;
        Ok(EquivalentSchedule::new(resolved))
    }

    async fn resolve_schedules_count(
        &self,
        channels: &[Id],
        start: DateTime<Utc>,
        count: usize,
        source: &Source,
        selected_sources: &BTreeSet<Source>,
    ) -> Result<EquivalentSchedule> {
        let interval = Interval::new(start, start + self.max_schedule_length);
        let schedule = self
            .resolve_schedules(channels, interval, source, selected_sources)
            .await?;
        Ok(schedule.with_limited_broadcasts(count))
    }

    async fn update_schedule(&self, update: &ScheduleUpdate) -> Result<()> {
        self.metrics.record_call();
        let schedule = &update.schedule;
        let channel = schedule.channel;

        let item_ids: Vec<Id> = {
            let mut ids: Vec<Id> = schedule.entries.iter().map(|e| e.item).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };
        let (graphs, content) = self.resolve_graphs_and_content(&item_ids).await?;

        let update_marker = uuid::Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await?;

        let mut update_broadcast_ids: Vec<String> = Vec::new();
        for entry in &schedule.entries {
            let broadcast_ref = &entry.broadcast;
            let broadcast = Broadcast::new(
                broadcast_ref.channel,
                broadcast_ref.interval,
                broadcast_ref.source_id.clone(),
            );
            update_broadcast_ids.push(broadcast.source_id.clone());

            let graph = Self::graph_for(entry.item, &graphs, &content);
            let items = Self::equivalent_items(&graph, &content);
            let broadcast_json = serde_json::to_string(&broadcast)?;
            let graph_json = serde_json::to_string(&graph)?;
            let content_json = serde_json::to_string(&items)?;

            for block_start in block_starts(&broadcast.interval, self.block_length) {
                sqlx::query(
                    "INSERT INTO equivalent_schedule
                         (source, channel, block_start, broadcast_id, broadcast_start,
                          item_id, broadcast, graph, content, active, schedule_update)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
                     ON CONFLICT(source, channel, block_start, broadcast_id) DO UPDATE SET
                         broadcast_start = excluded.broadcast_start,
                         item_id = excluded.item_id,
                         broadcast = excluded.broadcast,
                         graph = excluded.graph,
                         content = excluded.content,
                         active = 1,
                         schedule_update = excluded.schedule_update",
                )
                .bind(update.source.key())
                .bind(channel.to_string())
                .bind(block_start)
                .bind(&broadcast.source_id)
                .bind(broadcast.interval.start())
                .bind(entry.item.to_string())
                .bind(&broadcast_json)
                .bind(&graph_json)
                .bind(&content_json)
                .bind(&update_marker)
                .execute(&mut *tx)
                .await?;
            }
        }

        // Rows the update superseded inside its own interval go away; rows
        // outside the interval are left alone even when their broadcast no
        // longer exists upstream, which is a known divergence between the
        // stored state and the staleness the update reports.
        for block_start in block_starts(&schedule.interval, self.block_length) {
            let mut qb = sqlx::QueryBuilder::new(
                "DELETE FROM equivalent_schedule WHERE source = ",
            );
            qb.push_bind(update.source.key());
            qb.push(" AND channel = ");
            qb.push_bind(channel.to_string());
            qb.push(" AND block_start = ");
            qb.push_bind(block_start);
            qb.push(" AND broadcast_start >= ");
            qb.push_bind(schedule.interval.start());
            qb.push(" AND broadcast_start < ");
            qb.push_bind(schedule.interval.end());
            if !update_broadcast_ids.is_empty() {
                qb.push(" AND broadcast_id NOT IN (");
                let mut sep = qb.separated(", ");
                for id in &update_broadcast_ids {
                    sep.push_bind(id);
                }
                qb.push(")");
            }
            qb.build().execute(&mut *tx).await?;
        }

        // Explicitly withdrawn broadcasts stay in history, flagged off.
        for stale in &update.stale_broadcasts {
            sqlx::query(
                "UPDATE equivalent_schedule SET active = 0
                 WHERE source = ? AND channel = ? AND broadcast_id = ?",
            )
            .bind(update.source.key())
            .bind(stale.channel.to_string())
            .bind(&stale.source_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            source = %update.source,
            %channel,
            entries = schedule.entries.len(),
            stale = update.stale_broadcasts.len(),
            "applied equivalent schedule update"
        );
        Ok(())
    }

    async fn update_equivalences(&self, update: &EquivalenceGraphUpdate) -> Result<()> {
        self.metrics.record_call();
        let touched = update.touched_ids();
        let (graphs, content) = self.resolve_graphs_and_content(&touched).await?;

        let affected = self.rows_for_items(&touched).await?;
        let mut tx = self.pool.begin().await?;
        for (rowid, item_id, _) in &affected {
            let graph = Self::graph_for(*item_id, &graphs, &content);
            let items = Self::equivalent_items(&graph, &content);
            sqlx::query(
                "UPDATE equivalent_schedule
                 SET graph = ?, content = ?, equiv_update = CURRENT_TIMESTAMP
                 WHERE rowid = ?",
            )
            .bind(serde_json::to_string(&graph)?)
            .bind(serde_json::to_string(&items)?)
            .bind(rowid)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(touched = touched.len(), rows = affected.len(), "refreshed equivalences");
        Ok(())
    }

    async fn update_content(&self, items: &[Item]) -> Result<()> {
        self.metrics.record_call();
        let ids: Vec<Id> = items.iter().map(|i| i.id).collect();
        let graphs = self
            .with_timeout("graph resolve", self.graphs.resolve_ids(&ids))
            .await?;

        // An edited item shows up in its own rows and in rows of everything
        // equivalent to it.
        let affected_ids: Vec<Id> = {
            let mut all: BTreeSet<Id> = ids.iter().copied().collect();
            all.extend(graphs.values().flat_map(|g| g.equivalence_set()));
            all.into_iter().collect()
        };
        let snapshots: BTreeMap<Id, &Item> = items.iter().map(|i| (i.id, i)).collect();

        let affected = self.rows_for_items(&affected_ids).await?;
        let mut tx = self.pool.begin().await?;
        let mut refreshed = 0usize;
        for (rowid, _, _) in &affected {
            let row = sqlx::query("SELECT content FROM equivalent_schedule WHERE rowid = ?")
                .bind(rowid)
                .fetch_one(&mut *tx)
                .await?;
            let mut stored: Vec<Item> = serde_json::from_str(row.get("content"))?;
            let mut changed = false;
            for item in &mut stored {
                if let Some(snapshot) = snapshots.get(&item.id) {
                    // Broadcast placement belongs to the schedule stream,
                    // never to a content refresh.
                    let broadcasts = std::mem::take(&mut item.broadcasts);
                    let mut updated = (*snapshot).clone();
                    updated.broadcasts = broadcasts;
                    *item = updated;
                    changed = true;
                }
            }
            if changed {
                sqlx::query(
                    "UPDATE equivalent_schedule
                     SET content = ?, equiv_update = CURRENT_TIMESTAMP
                     WHERE rowid = ?",
                )
                .bind(serde_json::to_string(&stored)?)
                .bind(rowid)
                .execute(&mut *tx)
                .await?;
                refreshed += 1;
            }
        }
        tx.commit().await?;
        debug!(items = items.len(), rows = refreshed, "refreshed content snapshots");
        Ok(())
    }
}
