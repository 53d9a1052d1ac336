//! Equivalence graph store
//!
//! Applies assertions and keeps the persisted graph partition consistent.
//! One assertion can merge previously disjoint graphs or split one graph in
//! two, so the store never patches components incrementally: it rebuilds
//! every affected component from the updated adjacency lists and rewrites
//! the partition wholesale. A persistence failure therefore means the whole
//! assertion must be retried, never resumed part-way.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use airtime_common::model::{
    Adjacents, EquivalenceAssertion, EquivalenceGraph, EquivalenceGraphUpdate, Id, ResourceRef,
    Source,
};

use crate::messaging::MessageSender;
use crate::observe::StoreMetrics;
use crate::{Error, Result};
use airtime_common::messages::EquivalenceGraphUpdateMessage;

#[async_trait]
pub trait EquivalenceGraphStore: Send + Sync {
    /// Apply one assertion. Returns `None` when the assertion changes
    /// nothing (the permitted efferent set is already as asserted).
    async fn update_equivalences(
        &self,
        assertion: EquivalenceAssertion,
    ) -> Result<Option<EquivalenceGraphUpdate>>;

    /// Graphs for the given ids. Ids with no recorded assertions are absent
    /// from the result; callers treat a missing id as equivalent only to
    /// itself.
    async fn resolve_ids(&self, ids: &[Id]) -> Result<BTreeMap<Id, EquivalenceGraph>>;
}

/// SQLite-backed [`EquivalenceGraphStore`].
///
/// Graphs are stored as one serialized row per graph plus a member index
/// mapping each resource id to its graph. Writes are serialized behind a
/// mutex; recomputation of a partition is not safe to interleave.
pub struct SqliteEquivalenceGraphStore {
    pool: SqlitePool,
    sender: Arc<dyn MessageSender<EquivalenceGraphUpdateMessage>>,
    metrics: Arc<StoreMetrics>,
    graph_size_warn_threshold: usize,
    write_lock: tokio::sync::Mutex<()>,
}

impl SqliteEquivalenceGraphStore {
    pub fn new(
        pool: SqlitePool,
        sender: Arc<dyn MessageSender<EquivalenceGraphUpdateMessage>>,
        metrics: Arc<StoreMetrics>,
        graph_size_warn_threshold: usize,
    ) -> Self {
        Self {
            pool,
            sender,
            metrics,
            graph_size_warn_threshold,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Stored graphs covering any of `ids`, keyed by graph id.
    async fn load_graphs_covering(&self, ids: &[Id]) -> Result<BTreeMap<Id, EquivalenceGraph>> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let mut qb = sqlx::QueryBuilder::new(
            "SELECT DISTINCT graph_id FROM equivalence_member WHERE member_id IN (",
        );
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(id.to_string());
        }
        qb.push(")");
        let graph_ids: Vec<String> = qb
            .build()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| row.get("graph_id"))
            .collect();

        if graph_ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let mut qb =
            sqlx::QueryBuilder::new("SELECT graph_id, data FROM equivalence_graph WHERE graph_id IN (");
        let mut sep = qb.separated(", ");
        for graph_id in &graph_ids {
            sep.push_bind(graph_id);
        }
        qb.push(")");
        let rows = qb.build().fetch_all(&self.pool).await?;

        let mut graphs = BTreeMap::new();
        for row in rows {
            let graph_id: String = row.get("graph_id");
            let data: String = row.get("data");
            let graph_id = graph_id
                .parse::<Id>()
                .map_err(|e| Error::InvalidInput(format!("stored graph id: {e}")))?;
            let graph: EquivalenceGraph = serde_json::from_str(&data)?;
            graphs.insert(graph_id, graph);
        }
        Ok(graphs)
    }

    async fn persist(
        &self,
        prior_graph_ids: &BTreeSet<Id>,
        update: &EquivalenceGraphUpdate,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for graph_id in prior_graph_ids {
            let key = graph_id.to_string();
            sqlx::query("DELETE FROM equivalence_graph WHERE graph_id = ?")
                .bind(&key)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM equivalence_member WHERE graph_id = ?")
                .bind(&key)
                .execute(&mut *tx)
                .await?;
        }

        for graph in update.all_graphs() {
            let key = graph.id().to_string();
            let data = serde_json::to_string(graph)?;
            sqlx::query(
                "INSERT OR REPLACE INTO equivalence_graph (graph_id, data, updated_at)
                 VALUES (?, ?, ?)",
            )
            .bind(&key)
            .bind(&data)
            .bind(graph.updated())
            .execute(&mut *tx)
            .await?;

            for member in graph.equivalence_set() {
                sqlx::query(
                    "INSERT OR REPLACE INTO equivalence_member (member_id, graph_id) VALUES (?, ?)",
                )
                .bind(member.to_string())
                .bind(&key)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl EquivalenceGraphStore for SqliteEquivalenceGraphStore {
    async fn update_equivalences(
        &self,
        assertion: EquivalenceAssertion,
    ) -> Result<Option<EquivalenceGraphUpdate>> {
        let _guard = self.write_lock.lock().await;
        self.metrics.record_call();

        let subject = assertion.subject.clone();
        let sources: BTreeSet<Source> = assertion.sources.iter().cloned().collect();
        let asserted: BTreeMap<Id, ResourceRef> = assertion
            .asserted_adjacents
            .iter()
            .cloned()
            .map(|r| (r.id, r))
            .collect();

        let seed_ids: Vec<Id> = std::iter::once(subject.id)
            .chain(asserted.keys().copied())
            .collect();
        let prior_graphs = self.load_graphs_covering(&seed_ids).await.map_err(|e| {
            self.metrics.record_failure();
            e
        })?;
        let prior_graph_ids: BTreeSet<Id> = prior_graphs.keys().copied().collect();

        // Universe of adjacency lists the recomputation can touch: every
        // member of every graph covering the subject or an asserted id.
        let mut adjacency: BTreeMap<Id, Adjacents> = prior_graphs
            .values()
            .flat_map(|g| g.adjacency_list().clone())
            .collect();
        adjacency
            .entry(subject.id)
            .or_insert_with(|| Adjacents::singleton(subject.clone()));
        // An adjacent outside the permitted sources never enters the
        // partition: no edge to it survives, and seeding it would persist a
        // graph for an id with no recorded assertions.
        for resource in asserted.values().filter(|r| sources.contains(&r.source)) {
            adjacency
                .entry(resource.id)
                .or_insert_with(|| Adjacents::singleton(resource.clone()));
        }

        let current = adjacency
            .get(&subject.id)
            .cloned()
            .expect("subject adjacency seeded above");

        // Replace only the assertable subset of the subject's outgoing
        // edges: edges owned by sources outside the permitted set survive.
        let mut new_efferent: BTreeMap<Id, ResourceRef> = current
            .efferent()
            .filter(|r| !sources.contains(&r.source))
            .cloned()
            .map(|r| (r.id, r))
            .collect();
        for resource in asserted.values().filter(|r| sources.contains(&r.source)) {
            new_efferent.insert(resource.id, resource.clone());
        }
        new_efferent.insert(subject.id, subject.clone());

        let current_efferent_ids: BTreeSet<Id> = current.efferent().map(|r| r.id).collect();
        // Full refs, not just ids: a re-assertion that moves a neighbour to
        // a different source must replace the stored ref.
        let current_refs: BTreeSet<&ResourceRef> = current.efferent().collect();
        let new_refs: BTreeSet<&ResourceRef> = new_efferent.values().collect();
        if new_refs == current_refs {
            debug!(subject = %subject.id, "equivalence assertion is a no-op");
            self.metrics.record_no_op();
            return Ok(None);
        }

        adjacency.insert(subject.id, current.with_efferent(new_efferent.values().cloned()));

        // Mirror the assertion on the incoming side of each permitted
        // neighbour, both the newly asserted ones and the ones dropped.
        let neighbours: BTreeSet<Id> = current_efferent_ids
            .iter()
            .copied()
            .chain(asserted.keys().copied())
            .filter(|id| *id != subject.id)
            .collect();
        for id in neighbours {
            let Some(adj) = adjacency.get(&id) else { continue };
            if !sources.contains(adj.source()) {
                continue;
            }
            let updated = if asserted.contains_key(&id) {
                adj.with_afferent(subject.clone())
            } else {
                adj.without_afferent(subject.id)
            };
            adjacency.insert(id, updated);
        }

        let components = partition(&adjacency);
        let mut updated_graph = None;
        let mut created = Vec::new();
        for component in components {
            let graph = EquivalenceGraph::from_adjacents(component);
            if graph.contains(subject.id) {
                updated_graph = Some(graph);
            } else {
                // Split-out fragments, plus any graph the repartition left
                // intact; all are rewritten with the partition.
                created.push(graph);
            }
        }
        let updated_graph = updated_graph.expect("subject is in some component");

        let new_graph_ids: BTreeSet<Id> = std::iter::once(updated_graph.id())
            .chain(created.iter().map(|g| g.id()))
            .collect();
        let deleted: Vec<Id> = prior_graph_ids
            .iter()
            .copied()
            .filter(|id| !new_graph_ids.contains(id))
            .collect();

        let update = EquivalenceGraphUpdate {
            updated: updated_graph,
            created,
            deleted,
            assertion: Some(assertion),
        };

        // Split fragments can be oversized too, not just the subject's graph.
        for (graph_id, size) in oversized_graphs(&update, self.graph_size_warn_threshold) {
            warn!(
                graph = %graph_id,
                size,
                threshold = self.graph_size_warn_threshold,
                "equivalence graph exceeds size threshold"
            );
        }

        self.persist(&prior_graph_ids, &update).await.map_err(|e| {
            self.metrics.record_failure();
            e
        })?;

        // Downstream stores re-resolve from here, so a lost message delays
        // a refresh but never corrupts state.
        let message = EquivalenceGraphUpdateMessage::new(update.clone());
        if let Err(e) = self.sender.send(message).await {
            warn!(error = %e, subject = %update.updated.id(), "failed to send graph update message");
        }

        Ok(Some(update))
    }

    async fn resolve_ids(&self, ids: &[Id]) -> Result<BTreeMap<Id, EquivalenceGraph>> {
        let graphs = self.load_graphs_covering(ids).await?;
        let mut resolved = BTreeMap::new();
        for id in ids {
            if let Some(graph) = graphs.values().find(|g| g.contains(*id)) {
                resolved.insert(*id, graph.clone());
            }
        }
        Ok(resolved)
    }
}

/// Every graph in the update whose membership exceeds `threshold`, as
/// (graph id, size) pairs.
fn oversized_graphs(update: &EquivalenceGraphUpdate, threshold: usize) -> Vec<(Id, usize)> {
    update
        .all_graphs()
        .filter(|g| g.len() > threshold)
        .map(|g| (g.id(), g.len()))
        .collect()
}

/// Connected components of the undirected closure of efferent and afferent
/// edges, restricted to ids present in `adjacency`.
fn partition(adjacency: &BTreeMap<Id, Adjacents>) -> Vec<Vec<Adjacents>> {
    // An edge may survive on one side only (a neighbour outside the
    // assertion's sources keeps its afferent record), so symmetrize before
    // traversing: an edge kept on either side joins its endpoints.
    let mut edges: BTreeMap<Id, BTreeSet<Id>> = BTreeMap::new();
    for (id, adj) in adjacency {
        for next in adj.adjacent_ids() {
            if adjacency.contains_key(&next) {
                edges.entry(*id).or_default().insert(next);
                edges.entry(next).or_default().insert(*id);
            }
        }
    }

    let mut components = Vec::new();
    let mut seen: BTreeSet<Id> = BTreeSet::new();

    for start in adjacency.keys().copied() {
        if seen.contains(&start) {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = VecDeque::from([start]);
        seen.insert(start);
        while let Some(id) = queue.pop_front() {
            if let Some(adj) = adjacency.get(&id) {
                component.push(adj.clone());
            }
            let Some(neighbours) = edges.get(&id) else { continue };
            for next in neighbours.iter().copied() {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        components.push(component);
    }

    components
}
