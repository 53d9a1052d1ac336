//! Channel references

use serde::{Deserialize, Serialize};

use super::Id;

/// Reference to a broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: Id,
    /// Human-readable channel key, e.g. `bbc-one`.
    pub key: String,
}

impl ChannelRef {
    pub fn new(id: Id, key: impl Into<String>) -> Self {
        Self { id, key: key.into() }
    }
}
