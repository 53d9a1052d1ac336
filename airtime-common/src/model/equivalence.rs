//! Equivalence graph model
//!
//! Publishers assert that their representation of a piece of content is "the
//! same real-world thing" as another publisher's. Assertions form a directed
//! graph; the equivalence set of an id is the connected component reachable
//! over the undirected union of outgoing (efferent) and incoming (afferent)
//! edges. Recomputing those components is the store's job; this module is the
//! pure data model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Id, Source};

/// Reference to a resource together with the publisher that owns it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub id: Id,
    pub source: Source,
}

impl ResourceRef {
    pub fn new(id: Id, source: Source) -> Self {
        Self { id, source }
    }
}

/// One entry in an equivalence adjacency list: a subject and the edges it
/// participates in.
///
/// - *efferent*: resources the subject asserted as equivalent (outgoing).
/// - *afferent*: resources which asserted the subject as equivalent
///   (incoming).
///
/// Both sets always contain the subject itself, so every equivalence set is
/// reflexive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjacents {
    subject: ResourceRef,
    created: DateTime<Utc>,
    efferent: BTreeMap<Id, ResourceRef>,
    afferent: BTreeMap<Id, ResourceRef>,
}

impl Adjacents {
    /// Adjacents for a subject with no recorded assertions: equivalent only
    /// to itself.
    pub fn singleton(subject: ResourceRef) -> Self {
        let self_edge = BTreeMap::from([(subject.id, subject.clone())]);
        Self {
            subject,
            created: Utc::now(),
            efferent: self_edge.clone(),
            afferent: self_edge,
        }
    }

    pub fn id(&self) -> Id {
        self.subject.id
    }

    pub fn source(&self) -> &Source {
        &self.subject.source
    }

    pub fn subject(&self) -> &ResourceRef {
        &self.subject
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn efferent(&self) -> impl Iterator<Item = &ResourceRef> {
        self.efferent.values()
    }

    pub fn afferent(&self) -> impl Iterator<Item = &ResourceRef> {
        self.afferent.values()
    }

    /// Ids adjacent to the subject in either direction (the undirected
    /// neighbourhood used for component traversal).
    pub fn adjacent_ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.efferent
            .keys()
            .chain(self.afferent.keys().filter(|id| !self.efferent.contains_key(id)))
            .copied()
    }

    pub fn has_efferent(&self, id: Id) -> bool {
        self.efferent.contains_key(&id)
    }

    pub fn has_afferent(&self, id: Id) -> bool {
        self.afferent.contains_key(&id)
    }

    /// Replace the outgoing edge set wholesale. The subject's self-edge is
    /// reinstated if the caller left it out.
    pub fn with_efferent(&self, refs: impl IntoIterator<Item = ResourceRef>) -> Self {
        let mut efferent: BTreeMap<Id, ResourceRef> =
            refs.into_iter().map(|r| (r.id, r)).collect();
        efferent.entry(self.subject.id).or_insert_with(|| self.subject.clone());
        Self {
            subject: self.subject.clone(),
            created: self.created,
            efferent,
            afferent: self.afferent.clone(),
        }
    }

    pub fn with_afferent(&self, incoming: ResourceRef) -> Self {
        let mut afferent = self.afferent.clone();
        afferent.insert(incoming.id, incoming);
        Self {
            subject: self.subject.clone(),
            created: self.created,
            efferent: self.efferent.clone(),
            afferent,
        }
    }

    pub fn without_afferent(&self, id: Id) -> Self {
        let mut afferent = self.afferent.clone();
        afferent.remove(&id);
        afferent.entry(self.subject.id).or_insert_with(|| self.subject.clone());
        Self {
            subject: self.subject.clone(),
            created: self.created,
            efferent: self.efferent.clone(),
            afferent,
        }
    }
}

/// A connected set of equivalent resources and how they link together.
///
/// The graph is identified by the least id among its members so the identity
/// is stable under edge churn that leaves membership alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquivalenceGraph {
    adjacency: BTreeMap<Id, Adjacents>,
    updated: DateTime<Utc>,
}

impl EquivalenceGraph {
    pub fn from_adjacents(set: impl IntoIterator<Item = Adjacents>) -> Self {
        let adjacency: BTreeMap<Id, Adjacents> =
            set.into_iter().map(|a| (a.id(), a)).collect();
        assert!(!adjacency.is_empty(), "equivalence graph must have members");
        Self { adjacency, updated: Utc::now() }
    }

    /// Graph containing only the subject.
    pub fn singleton(subject: ResourceRef) -> Self {
        Self::from_adjacents([Adjacents::singleton(subject)])
    }

    pub fn id(&self) -> Id {
        *self.adjacency.keys().next().expect("graph is non-empty")
    }

    pub fn equivalence_set(&self) -> impl Iterator<Item = Id> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn contains(&self, id: Id) -> bool {
        self.adjacency.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn adjacents(&self, id: Id) -> Option<&Adjacents> {
        self.adjacency.get(&id)
    }

    pub fn adjacency_list(&self) -> &BTreeMap<Id, Adjacents> {
        &self.adjacency
    }

    pub fn updated(&self) -> DateTime<Utc> {
        self.updated
    }
}

/// An equivalence assertion: `subject` claims the given adjacents are the
/// same thing, on behalf of the permitted `sources`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquivalenceAssertion {
    pub subject: ResourceRef,
    pub asserted_adjacents: Vec<ResourceRef>,
    pub sources: Vec<Source>,
}

/// The result of applying one assertion.
///
/// One graph, containing the subject, is always updated. Components split
/// out of it are `created`; components merged into it are `deleted` (by
/// graph id). Carries the originating assertion so consumers can re-apply
/// it idempotently against current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquivalenceGraphUpdate {
    pub updated: EquivalenceGraph,
    pub created: Vec<EquivalenceGraph>,
    pub deleted: Vec<Id>,
    pub assertion: Option<EquivalenceAssertion>,
}

impl EquivalenceGraphUpdate {
    /// All graphs resulting from this update (updated + created).
    pub fn all_graphs(&self) -> impl Iterator<Item = &EquivalenceGraph> {
        std::iter::once(&self.updated).chain(self.created.iter())
    }

    /// Every id whose graph membership this update may have touched.
    pub fn touched_ids(&self) -> Vec<Id> {
        let mut ids: Vec<Id> = self
            .all_graphs()
            .flat_map(|g| g.equivalence_set())
            .chain(self.deleted.iter().copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(source: &str) -> ResourceRef {
        ResourceRef::new(Id::random(), Source::new(source))
    }

    #[test]
    fn test_singleton_is_reflexive() {
        let subject = resource("a");
        let adj = Adjacents::singleton(subject.clone());
        assert!(adj.has_efferent(subject.id));
        assert!(adj.has_afferent(subject.id));
        assert_eq!(adj.adjacent_ids().collect::<Vec<_>>(), vec![subject.id]);
    }

    #[test]
    fn test_with_efferent_reinstates_self_edge() {
        let subject = resource("a");
        let other = resource("b");
        let adj = Adjacents::singleton(subject.clone()).with_efferent([other.clone()]);
        assert!(adj.has_efferent(subject.id));
        assert!(adj.has_efferent(other.id));
    }

    #[test]
    fn test_graph_id_is_least_member() {
        let a = resource("a");
        let b = resource("b");
        let least = a.id.min(b.id);
        let graph = EquivalenceGraph::from_adjacents([
            Adjacents::singleton(a),
            Adjacents::singleton(b),
        ]);
        assert_eq!(graph.id(), least);
    }

    #[test]
    fn test_touched_ids_cover_all_fragments() {
        let a = resource("a");
        let b = resource("b");
        let deleted = Id::random();
        let update = EquivalenceGraphUpdate {
            updated: EquivalenceGraph::singleton(a.clone()),
            created: vec![EquivalenceGraph::singleton(b.clone())],
            deleted: vec![deleted],
            assertion: None,
        };
        let touched = update.touched_ids();
        assert!(touched.contains(&a.id));
        assert!(touched.contains(&b.id));
        assert!(touched.contains(&deleted));
    }
}
