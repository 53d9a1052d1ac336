//! Update stream message types
//!
//! Three independent streams feed the platform: schedule updates,
//! equivalence graph updates and content updates. Delivery is at-least-once
//! with no ordering guarantee across streams, so every consumer treats the
//! payload as a hint and re-resolves authoritative state before applying
//! downstream effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{EquivalenceGraphUpdate, Id, ScheduleUpdate};

/// A schedule write for one (source, channel, interval).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleUpdateMessage {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub update: ScheduleUpdate,
}

impl ScheduleUpdateMessage {
    pub fn new(update: ScheduleUpdate) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            update,
        }
    }

    /// Partition key: updates for one channel stay ordered within a stream.
    pub fn partition_key(&self) -> Id {
        self.update.schedule.channel
    }
}

/// The graph fragments changed by one equivalence assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquivalenceGraphUpdateMessage {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub update: EquivalenceGraphUpdate,
}

impl EquivalenceGraphUpdateMessage {
    pub fn new(update: EquivalenceGraphUpdate) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            update,
        }
    }

    pub fn partition_key(&self) -> Id {
        self.update.updated.id()
    }
}

/// Content snapshots changed outside the schedule (title edits etc.).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentUpdateMessage {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub updated_ids: Vec<Id>,
}

impl ContentUpdateMessage {
    pub fn new(updated_ids: Vec<Id>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            updated_ids,
        }
    }
}
