//! Injected observability context
//!
//! Each orchestration store receives a [`StoreMetrics`] handle instead of
//! reaching for a global registry. Counters are plain atomics; anything
//! heavier (histograms, exporters) lives outside this crate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-operation counters for one store.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    calls: AtomicU64,
    failures: AtomicU64,
    no_ops: AtomicU64,
}

impl StoreMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// An update that resolved to no change and was suppressed.
    pub fn record_no_op(&self) {
        self.no_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn no_ops(&self) -> u64 {
        self.no_ops.load(Ordering::Relaxed)
    }
}
