//! Database access
//!
//! SQLite-backed persistence for equivalence graphs, schedule blocks,
//! materialized equivalent schedules, and content.

mod init;

pub use init::{init_database, init_memory_database, init_schema};
