//! Global atomic counters for mend observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a pipeline run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters. No allocations and no locking.
pub struct Metrics {
    recoveries_executed: AtomicU64,
    steps_recorded: AtomicU64,
    fallbacks_applied: AtomicU64,
    verifications_executed: AtomicU64,
    emergency_activations: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            recoveries_executed: AtomicU64::new(0),
            steps_recorded: AtomicU64::new(0),
            fallbacks_applied: AtomicU64::new(0),
            verifications_executed: AtomicU64::new(0),
            emergency_activations: AtomicU64::new(0),
        }
    }

    pub fn inc_recoveries(&self) {
        self.recoveries_executed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "recoveries_executed", "counter incremented");
    }

    pub fn inc_steps(&self) {
        self.steps_recorded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "steps_recorded", "counter incremented");
    }

    pub fn inc_fallbacks(&self) {
        self.fallbacks_applied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fallbacks_applied", "counter incremented");
    }

    pub fn inc_verifications(&self) {
        self.verifications_executed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "verifications_executed", "counter incremented");
    }

    pub fn inc_emergencies(&self) {
        self.emergency_activations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "emergency_activations", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            recoveries_executed = self.recoveries_executed(),
            steps_recorded = self.steps_recorded(),
            fallbacks_applied = self.fallbacks_applied(),
            verifications_executed = self.verifications_executed(),
            emergency_activations = self.emergency_activations(),
        );
    }

    pub fn recoveries_executed(&self) -> u64 {
        self.recoveries_executed.load(Ordering::Relaxed)
    }

    pub fn steps_recorded(&self) -> u64 {
        self.steps_recorded.load(Ordering::Relaxed)
    }

    pub fn fallbacks_applied(&self) -> u64 {
        self.fallbacks_applied.load(Ordering::Relaxed)
    }

    pub fn verifications_executed(&self) -> u64 {
        self.verifications_executed.load(Ordering::Relaxed)
    }

    pub fn emergency_activations(&self) -> u64 {
        self.emergency_activations.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.recoveries_executed.store(0, Ordering::Relaxed);
        self.steps_recorded.store(0, Ordering::Relaxed);
        self.fallbacks_applied.store(0, Ordering::Relaxed);
        self.verifications_executed.store(0, Ordering::Relaxed);
        self.emergency_activations.store(0, Ordering::Relaxed);
    }
}
