//! Configuration loading
//!
//! Resolution priority:
//! 1. Explicit path supplied by the caller
//! 2. `AIRTIME_CONFIG` environment variable
//! 3. `~/.config/airtime/config.toml`
//! 4. Compiled defaults
//!
//! All fields are optional in the file; missing fields fall back to their
//! defaults, so a partial config is valid.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;

use crate::{Error, Result};

/// Tuning knobs for the schedule and equivalence stores.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AirtimeConfig {
    /// Length of a schedule block in hours. Blocks tile time contiguously.
    pub block_length_hours: i64,
    /// Broadcast matcher start-time flexibility in seconds.
    pub start_flexibility_secs: i64,
    /// Broadcast matcher end-time flexibility in seconds. Absent means only
    /// start times need match.
    pub end_flexibility_secs: Option<i64>,
    /// Deadline for external resolution calls (graph, content, channel).
    pub resolve_timeout_secs: u64,
    /// Deadline for equivalent-view content refreshes.
    pub content_update_timeout_secs: u64,
    /// Base delay for the per-channel linear retry backoff.
    pub retry_base_delay_ms: u64,
    /// Lookahead window for count-bounded schedule resolution, in hours.
    pub max_schedule_length_hours: i64,
    /// Warn when a recomputed equivalence graph grows past this many members.
    pub graph_size_warn_threshold: usize,
}

impl Default for AirtimeConfig {
    fn default() -> Self {
        Self {
            block_length_hours: 24,
            start_flexibility_secs: 600,
            end_flexibility_secs: None,
            resolve_timeout_secs: 60,
            content_update_timeout_secs: 10,
            retry_base_delay_ms: 100,
            max_schedule_length_hours: 24,
            graph_size_warn_threshold: 150,
        }
    }
}

impl AirtimeConfig {
    /// Load configuration following the resolution priority above.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }
        if let Ok(path) = std::env::var("AIRTIME_CONFIG") {
            return Self::from_file(Path::new(&path));
        }
        if let Some(path) = default_config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn block_length(&self) -> Duration {
        Duration::hours(self.block_length_hours)
    }

    pub fn start_flexibility(&self) -> Duration {
        Duration::seconds(self.start_flexibility_secs)
    }

    pub fn end_flexibility(&self) -> Option<Duration> {
        self.end_flexibility_secs.map(Duration::seconds)
    }

    pub fn resolve_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn content_update_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.content_update_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn max_schedule_length(&self) -> Duration {
        Duration::hours(self.max_schedule_length_hours)
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("airtime").join("config.toml"))
}
