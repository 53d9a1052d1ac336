//! Schedule update stream consumer

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use airtime_common::messages::ScheduleUpdateMessage;

use crate::messaging::Worker;
use crate::schedule::EquivalentScheduleStore;
use crate::Result;

/// Applies schedule writes to the equivalent schedule view. The store
/// re-derives each entry's equivalent content from the current graph and
/// content state, so replaying a message is harmless.
pub struct ScheduleUpdateWorker {
    store: Arc<dyn EquivalentScheduleStore>,
}

impl ScheduleUpdateWorker {
    pub fn new(store: Arc<dyn EquivalentScheduleStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Worker<ScheduleUpdateMessage> for ScheduleUpdateWorker {
    async fn process(&self, message: ScheduleUpdateMessage) -> Result<()> {
        debug!(
            message_id = %message.message_id,
            channel = %message.update.schedule.channel,
            "processing schedule update message"
        );
        self.store.update_schedule(&message.update).await
    }
}
