//! Content persistence and equivalence-aware resolution

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use airtime_common::model::{Content, EquivalenceGraph, Id, ResourceRef, Source};

use crate::equiv::{EquivalenceGraphStore, Equivalent};
use crate::{Error, Result};

/// Read side of content storage: bulk lookup by id.
#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// Resolve all of `ids` in one call. Ids with no stored content are
    /// absent from the result. Any failure fails the whole call; there are
    /// no partial results.
    async fn resolve_ids(&self, ids: &[Id]) -> Result<BTreeMap<Id, Content>>;
}

/// Write side of content storage.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn write_content(&self, content: &Content) -> Result<()>;
}

/// SQLite-backed content store. Each kind of content serializes into the
/// same table under its kind tag.
pub struct SqliteContentStore {
    pool: SqlitePool,
}

impl SqliteContentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn write_content(&self, content: &Content) -> Result<()> {
        let data = serde_json::to_string(content)?;
        sqlx::query(
            "INSERT INTO content (id, source, data, updated_at)
             VALUES (?, ?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(id) DO UPDATE SET
                 source = excluded.source,
                 data = excluded.data,
                 updated_at = CURRENT_TIMESTAMP",
        )
        .bind(content.id().to_string())
        .bind(content.source().key())
        .bind(&data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ContentResolver for SqliteContentStore {
    async fn resolve_ids(&self, ids: &[Id]) -> Result<BTreeMap<Id, Content>> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let mut qb = sqlx::QueryBuilder::new("SELECT id, data FROM content WHERE id IN (");
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(id.to_string());
        }
        qb.push(")");
        let rows = qb.build().fetch_all(&self.pool).await?;

        let mut resolved = BTreeMap::new();
        for row in rows {
            let id: String = row.get("id");
            let data: String = row.get("data");
            let id = id
                .parse::<Id>()
                .map_err(|e| Error::InvalidInput(format!("stored content id: {e}")))?;
            let content: Content = serde_json::from_str(&data)?;
            resolved.insert(id, content);
        }
        Ok(resolved)
    }
}

/// Resolves the full equivalent content for a set of ids: equivalence sets
/// from the graph store, then one batched content lookup across every
/// member id, filtered per requested id to the selected sources.
pub struct EquivalentContentResolver {
    graphs: Arc<dyn EquivalenceGraphStore>,
    content: Arc<dyn ContentResolver>,
}

impl EquivalentContentResolver {
    pub fn new(graphs: Arc<dyn EquivalenceGraphStore>, content: Arc<dyn ContentResolver>) -> Self {
        Self { graphs, content }
    }

    /// Equivalent content for each of `ids`, filtered to `selected_sources`.
    /// An id with no graph resolves as equivalent only to itself.
    pub async fn resolve_ids(
        &self,
        ids: &[Id],
        selected_sources: &BTreeSet<Source>,
    ) -> Result<BTreeMap<Id, Equivalent<Content>>> {
        let graphs = self.graphs.resolve_ids(ids).await?;

        let member_ids: Vec<Id> = {
            let mut all: BTreeSet<Id> = ids.iter().copied().collect();
            all.extend(graphs.values().flat_map(|g| g.equivalence_set()));
            all.into_iter().collect()
        };
        let content = self.content.resolve_ids(&member_ids).await?;
        debug!(
            requested = ids.len(),
            members = member_ids.len(),
            resolved = content.len(),
            "resolved equivalent content"
        );

        let mut resolved = BTreeMap::new();
        for id in ids {
            let graph = match graphs.get(id) {
                Some(graph) => graph.clone(),
                None => singleton_graph(*id, &content),
            };
            let resources: Vec<Content> = graph
                .equivalence_set()
                .filter_map(|member| content.get(&member))
                .filter(|c| selected_sources.contains(c.source()))
                .cloned()
                .collect();
            resolved.insert(*id, Equivalent::new(graph, resources));
        }
        Ok(resolved)
    }

    /// The unfiltered membership of the equivalence set containing `id`.
    pub async fn resolve_equivalent_set(&self, id: Id) -> Result<Vec<Id>> {
        let graphs = self.graphs.resolve_ids(&[id]).await?;
        Ok(match graphs.get(&id) {
            Some(graph) => graph.equivalence_set().collect(),
            None => vec![id],
        })
    }
}

/// Graph for an id with no recorded assertions. The resource's source comes
/// from its content when known, otherwise a placeholder the filter will
/// treat as unselected.
fn singleton_graph(id: Id, content: &BTreeMap<Id, Content>) -> EquivalenceGraph {
    let source = content
        .get(&id)
        .map(|c| c.source().clone())
        .unwrap_or_else(|| Source::new("unknown"));
    EquivalenceGraph::singleton(ResourceRef::new(id, source))
}
