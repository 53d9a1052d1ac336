//! # Airtime Common Library
//!
//! Shared code for the Airtime broadcast-metadata services including:
//! - Data model (channels, content, broadcasts, schedules)
//! - Message types carried by the update streams
//! - Interval arithmetic
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod error;
pub mod messages;
pub mod model;
pub mod time;

pub use error::{Error, Result};
pub use time::Interval;
