//! Core data model shared across the Airtime services

pub mod broadcast;
pub mod channel;
pub mod content;
pub mod equivalence;
pub mod id;
pub mod schedule;
pub mod source;

pub use broadcast::{Broadcast, BroadcastRef};
pub use channel::ChannelRef;
pub use content::{Brand, Content, Episode, Item, Series};
pub use equivalence::{
    Adjacents, EquivalenceAssertion, EquivalenceGraph, EquivalenceGraphUpdate, ResourceRef,
};
pub use id::Id;
pub use schedule::{
    ChannelScheduleBlock, ItemAndBroadcast, ScheduleRef, ScheduleRefEntry, ScheduleUpdate,
};
pub use source::Source;
