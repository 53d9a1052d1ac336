//! Broadcasts: a transmission of an item on a channel over an interval
//!
//! A broadcast's identity is its `(channel, source_id)` pair. Changing the
//! transmission interval or flagging the broadcast inactive does not create a
//! new identity; only a different source broadcast id does.

use serde::{Deserialize, Serialize};

use crate::time::Interval;

use super::Id;

/// A transmission slot on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Broadcast {
    /// Channel the transmission goes out on.
    pub channel: Id,
    /// Transmission interval `[start, end)`.
    pub interval: Interval,
    /// Publisher-scoped broadcast identifier.
    pub source_id: String,
    /// Whether the broadcast should currently be visible in resolved output.
    pub actively_published: bool,
}

impl Broadcast {
    pub fn new(channel: Id, interval: Interval, source_id: impl Into<String>) -> Self {
        Self {
            channel,
            interval,
            source_id: source_id.into(),
            actively_published: true,
        }
    }

    /// Identity comparison: same channel, same source broadcast id.
    pub fn same_identity(&self, other: &Broadcast) -> bool {
        self.channel == other.channel && self.source_id == other.source_id
    }

    pub fn to_ref(&self) -> BroadcastRef {
        BroadcastRef {
            source_id: self.source_id.clone(),
            channel: self.channel,
            interval: self.interval,
        }
    }
}

/// Lightweight reference to a broadcast, as carried by update messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BroadcastRef {
    pub source_id: String,
    pub channel: Id,
    pub interval: Interval,
}
