//! # Airtime Store (airtime-store)
//!
//! The equivalence-aware schedule consistency engine:
//! - merge incoming broadcast updates into time-blocked per-channel
//!   schedules and identify entries that became stale,
//! - maintain the directed equivalence graph and recompute connected
//!   equivalence sets as assertions change,
//! - keep the read-optimized equivalent-schedule view consistent as
//!   schedule, equivalence and content updates arrive out of order on
//!   independent streams.
//!
//! The stores are reached through their Rust interfaces only; transport,
//! HTTP and search belong to other services.

pub mod db;
pub mod equiv;
pub mod error;
pub mod matcher;
pub mod messaging;
pub mod observe;
pub mod schedule;
pub mod workers;

pub use error::{Error, Result};
pub use matcher::BroadcastMatcher;
