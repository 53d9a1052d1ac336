//! Publishers ("sources")
//!
//! A source is an independent data provider whose content and broadcasts may
//! duplicate another provider's. Sources are identified by a lowercase key,
//! e.g. `bbc.co.uk`.

use serde::{Deserialize, Serialize};

/// A publisher key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Source(String);

impl Source {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn key(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Source {
    fn from(key: &str) -> Self {
        Self(key.to_owned())
    }
}
