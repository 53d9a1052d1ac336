//! Content update stream consumer

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use airtime_common::messages::ContentUpdateMessage;
use airtime_common::model::Item;

use crate::equiv::ContentResolver;
use crate::messaging::Worker;
use crate::schedule::EquivalentScheduleStore;
use crate::Result;

/// Refreshes content snapshots inside the equivalent schedule view. The
/// message carries only ids; the current snapshots come from the content
/// store, so a replayed message re-applies the latest state, not the state
/// at send time.
pub struct ContentUpdateWorker {
    content: Arc<dyn ContentResolver>,
    store: Arc<dyn EquivalentScheduleStore>,
}

impl ContentUpdateWorker {
    pub fn new(
        content: Arc<dyn ContentResolver>,
        store: Arc<dyn EquivalentScheduleStore>,
    ) -> Self {
        Self { content, store }
    }
}

#[async_trait]
impl Worker<ContentUpdateMessage> for ContentUpdateWorker {
    async fn process(&self, message: ContentUpdateMessage) -> Result<()> {
        debug!(
            message_id = %message.message_id,
            ids = message.updated_ids.len(),
            "processing content update message"
        );
        let resolved = self.content.resolve_ids(&message.updated_ids).await?;
        let items: Vec<Item> = resolved
            .into_values()
            .filter_map(|c| c.into_item())
            .collect();
        if items.is_empty() {
            return Ok(());
        }
        self.store.update_content(&items).await
    }
}
