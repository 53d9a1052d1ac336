//! Equivalence graphs: persistence and equivalent-content resolution

mod content;
mod store;

pub use content::{ContentResolver, ContentStore, EquivalentContentResolver, SqliteContentStore};
pub use store::{EquivalenceGraphStore, SqliteEquivalenceGraphStore};

use airtime_common::model::EquivalenceGraph;
use serde::{Deserialize, Serialize};

/// A resolved equivalence set together with the resources backing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equivalent<T> {
    graph: EquivalenceGraph,
    resources: Vec<T>,
}

impl<T> Equivalent<T> {
    pub fn new(graph: EquivalenceGraph, resources: Vec<T>) -> Self {
        Self { graph, resources }
    }

    pub fn graph(&self) -> &EquivalenceGraph {
        &self.graph
    }

    pub fn resources(&self) -> &[T] {
        &self.resources
    }

    pub fn into_resources(self) -> Vec<T> {
        self.resources
    }
}
