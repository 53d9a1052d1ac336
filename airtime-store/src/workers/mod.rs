//! Update stream consumers
//!
//! One worker per stream, invoked by the transport with at-least-once
//! delivery and no ordering across streams. A worker never trusts a
//! message's embedded payload as ground truth: it re-resolves current state
//! from the authoritative store before applying downstream effects, so a
//! replayed older message cannot revert a later state. Recoverable failures
//! propagate so the transport redelivers.

mod content_update;
mod graph_update;
mod schedule_update;

pub use content_update::ContentUpdateWorker;
pub use graph_update::GraphUpdateWorker;
pub use schedule_update::ScheduleUpdateWorker;
