//! Equivalence graph update stream consumer

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use airtime_common::messages::EquivalenceGraphUpdateMessage;
use airtime_common::model::EquivalenceGraphUpdate;

use crate::equiv::EquivalenceGraphStore;
use crate::messaging::Worker;
use crate::schedule::EquivalentScheduleStore;
use crate::Result;

/// Refreshes the equivalent schedule view after a graph change.
///
/// The message's graphs say only *which ids moved*; the worker resolves the
/// graphs those ids belong to *now* and applies that, so a replayed message
/// describing an older partition cannot undo a newer one.
pub struct GraphUpdateWorker {
    graphs: Arc<dyn EquivalenceGraphStore>,
    store: Arc<dyn EquivalentScheduleStore>,
}

impl GraphUpdateWorker {
    pub fn new(
        graphs: Arc<dyn EquivalenceGraphStore>,
        store: Arc<dyn EquivalentScheduleStore>,
    ) -> Self {
        Self { graphs, store }
    }
}

#[async_trait]
impl Worker<EquivalenceGraphUpdateMessage> for GraphUpdateWorker {
    async fn process(&self, message: EquivalenceGraphUpdateMessage) -> Result<()> {
        let touched = message.update.touched_ids();
        debug!(
            message_id = %message.message_id,
            touched = touched.len(),
            "processing graph update message"
        );

        let current = self.graphs.resolve_ids(&touched).await?;
        let mut graphs: Vec<_> = current.into_values().collect();
        graphs.dedup_by_key(|g| g.id());

        let Some((first, rest)) = graphs.split_first() else {
            // Every touched id dissolved into an unasserted singleton;
            // refreshing by the message's ids still clears stale rows.
            return self.store.update_equivalences(&message.update).await;
        };
        // Ids no longer in any current graph still need their rows
        // refreshed; carry them in the deleted set so coverage is kept.
        let orphaned: Vec<_> = touched
            .iter()
            .copied()
            .filter(|id| !graphs.iter().any(|g| g.contains(*id)))
            .collect();
        let authoritative = EquivalenceGraphUpdate {
            updated: first.clone(),
            created: rest.to_vec(),
            deleted: orphaned,
            assertion: message.update.assertion.clone(),
        };
        self.store.update_equivalences(&authoritative).await
    }
}
