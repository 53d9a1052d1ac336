//! Schedule persistence and the equivalence-aware read model

mod block_updater;
mod equivalent;
mod equivalent_store;
mod store;

pub use block_updater::{update_blocks, ScheduleBlocksUpdate};
pub use equivalent::{
    EquivalentChannelSchedule, EquivalentSchedule, EquivalentScheduleEntry,
};
pub use equivalent_store::{EquivalentScheduleStore, SqliteEquivalentScheduleStore};
pub use store::{ScheduleStore, SqliteScheduleStore};
