//! Global atomic counters for MMLA observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a CLI command finishes).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    validations: AtomicU64,
    transitions_applied: AtomicU64,
    transitions_rejected: AtomicU64,
    repair_attempts: AtomicU64,
    fixer_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub validations: u64,
    pub transitions_applied: u64,
    pub transitions_rejected: u64,
    pub repair_attempts: u64,
    pub fixer_failures: u64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            validations: AtomicU64::new(0),
            transitions_applied: AtomicU64::new(0),
            transitions_rejected: AtomicU64::new(0),
            repair_attempts: AtomicU64::new(0),
            fixer_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_validations(&self) {
        self.validations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "validations", "counter incremented");
    }

    pub fn inc_transitions_applied(&self) {
        self.transitions_applied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "transitions_applied", "counter incremented");
    }

    pub fn inc_transitions_rejected(&self) {
        self.transitions_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "transitions_rejected", "counter incremented");
    }

    pub fn inc_repair_attempts(&self) {
        self.repair_attempts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "repair_attempts", "counter incremented");
    }

    pub fn inc_fixer_failures(&self) {
        self.fixer_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fixer_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries rather than on every increment.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            validations = s.validations,
            transitions_applied = s.transitions_applied,
            transitions_rejected = s.transitions_rejected,
            repair_attempts = s.repair_attempts,
            fixer_failures = s.fixer_failures,
        );
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            validations: self.validations.load(Ordering::Relaxed),
            transitions_applied: self.transitions_applied.load(Ordering::Relaxed),
            transitions_rejected: self.transitions_rejected.load(Ordering::Relaxed),
            repair_attempts: self.repair_attempts.load(Ordering::Relaxed),
            fixer_failures: self.fixer_failures.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.validations.store(0, Ordering::Relaxed);
        self.transitions_applied.store(0, Ordering::Relaxed);
        self.transitions_rejected.store(0, Ordering::Relaxed);
        self.repair_attempts.store(0, Ordering::Relaxed);
        self.fixer_failures.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_validations();
        m.inc_validations();
        m.inc_transitions_applied();
        m.inc_transitions_rejected();
        m.inc_repair_attempts();
        m.inc_fixer_failures();
        m.inc_fixer_failures();

        let s = m.snapshot();
        assert_eq!(s.validations, 2);
        assert_eq!(s.transitions_applied, 1);
        assert_eq!(s.transitions_rejected, 1);
        assert_eq!(s.repair_attempts, 1);
        assert_eq!(s.fixer_failures, 2);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_validations();
        m.inc_repair_attempts();
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }
}
