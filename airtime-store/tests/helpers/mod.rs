//! Shared test infrastructure for the store integration tests
//!
//! Builds fully wired stores on an in-memory database and provides
//! builders for the model types the tests assemble over and over.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::SqlitePool;
use tokio::sync::mpsc;

use airtime_common::messages::{EquivalenceGraphUpdateMessage, ScheduleUpdateMessage};
use airtime_common::model::{
    Broadcast, BroadcastRef, EquivalenceAssertion, Id, Item, ItemAndBroadcast, ResourceRef,
    ScheduleRef, ScheduleUpdate, Source,
};
use airtime_common::Interval;
use airtime_store::db::init_memory_database;
use airtime_store::equiv::{ContentStore, SqliteContentStore, SqliteEquivalenceGraphStore};
use airtime_store::messaging::{ChannelSender, NullSender};
use airtime_store::observe::StoreMetrics;
use airtime_store::schedule::{SqliteEquivalentScheduleStore, SqliteScheduleStore};
use airtime_store::BroadcastMatcher;

pub const BLOCK_LENGTH_HOURS: i64 = 1;

/// Fully wired stores over one in-memory database.
pub struct TestStores {
    pub pool: SqlitePool,
    pub graphs: Arc<SqliteEquivalenceGraphStore>,
    pub content: Arc<SqliteContentStore>,
    pub schedule: Arc<SqliteScheduleStore>,
    pub equivalent: Arc<SqliteEquivalentScheduleStore>,
    pub graph_messages: mpsc::UnboundedReceiver<EquivalenceGraphUpdateMessage>,
    pub schedule_messages: mpsc::UnboundedReceiver<ScheduleUpdateMessage>,
}

pub async fn test_stores() -> TestStores {
    let pool = init_memory_database().await.expect("in-memory database");

    let (graph_sender, graph_messages) = ChannelSender::new();
    let graphs = Arc::new(SqliteEquivalenceGraphStore::new(
        pool.clone(),
        Arc::new(graph_sender),
        StoreMetrics::new(),
        150,
    ));
    let content = Arc::new(SqliteContentStore::new(pool.clone()));

    let (schedule_sender, schedule_messages) = ChannelSender::new();
    let schedule = Arc::new(SqliteScheduleStore::new(
        pool.clone(),
        content.clone(),
        content.clone(),
        Arc::new(schedule_sender),
        Duration::hours(BLOCK_LENGTH_HOURS),
        std::time::Duration::from_secs(10),
    ));

    let equivalent = Arc::new(SqliteEquivalentScheduleStore::new(
        pool.clone(),
        graphs.clone(),
        content.clone(),
        BroadcastMatcher::new(Duration::minutes(10)),
        StoreMetrics::new(),
        Duration::hours(BLOCK_LENGTH_HOURS),
        Duration::hours(24),
        std::time::Duration::from_secs(30),
        std::time::Duration::from_millis(1),
    ));

    TestStores {
        pool,
        graphs,
        content,
        schedule,
        equivalent,
        graph_messages,
        schedule_messages,
    }
}

/// A graph store whose update messages go nowhere.
pub async fn quiet_graph_store(pool: SqlitePool) -> Arc<SqliteEquivalenceGraphStore> {
    Arc::new(SqliteEquivalenceGraphStore::new(
        pool,
        Arc::new(NullSender),
        StoreMetrics::new(),
        150,
    ))
}

/// Fixed reference instant all test schedules hang off.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap()
}

pub fn minutes(m: i64) -> DateTime<Utc> {
    t0() + Duration::minutes(m)
}

pub fn interval(start_min: i64, end_min: i64) -> Interval {
    Interval::new(minutes(start_min), minutes(end_min))
}

pub fn item(source: &str, title: &str) -> Item {
    Item::new(Id::random(), Source::new(source), title)
}

pub fn broadcast(channel: Id, source_id: &str, start_min: i64, end_min: i64) -> Broadcast {
    Broadcast::new(channel, interval(start_min, end_min), source_id)
}

pub fn entry(
    item: &Item,
    channel: Id,
    source_id: &str,
    start_min: i64,
    end_min: i64,
) -> ItemAndBroadcast {
    ItemAndBroadcast::new(
        item.clone(),
        broadcast(channel, source_id, start_min, end_min),
    )
}

pub fn assertion(subject: &ResourceRef, adjacents: &[ResourceRef], sources: &[&str]) -> EquivalenceAssertion {
    EquivalenceAssertion {
        subject: subject.clone(),
        asserted_adjacents: adjacents.to_vec(),
        sources: sources.iter().map(|s| Source::new(*s)).collect(),
    }
}

pub fn resource_of(item: &Item) -> ResourceRef {
    ResourceRef::new(item.id, item.source.clone())
}

pub fn sources(keys: &[&str]) -> BTreeSet<Source> {
    keys.iter().map(|s| Source::new(*s)).collect()
}

/// A schedule update placing `entries` on `channel` over the interval.
pub fn schedule_update(
    source: &str,
    channel: Id,
    update_interval: Interval,
    entries: &[ItemAndBroadcast],
) -> ScheduleUpdate {
    let mut schedule = ScheduleRef::new(channel, update_interval);
    for e in entries {
        schedule = schedule.with_entry(e.item.id, e.broadcast.to_ref());
    }
    ScheduleUpdate {
        source: Source::new(source),
        schedule,
        stale_broadcasts: Vec::new(),
    }
}

pub fn with_stale(mut update: ScheduleUpdate, stale: &[BroadcastRef]) -> ScheduleUpdate {
    update.stale_broadcasts = stale.to_vec();
    update
}

/// Store an item's content snapshot, carrying the given broadcasts.
pub async fn store_item(store: &SqliteContentStore, item: &Item, broadcasts: &[Broadcast]) {
    let mut snapshot = item.clone();
    snapshot.broadcasts = broadcasts.to_vec();
    store
        .write_content(&snapshot.into())
        .await
        .expect("content write");
}
