//! Global atomic counters for validator observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (the scheduler does this after every epoch).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations, no locking.
pub struct Metrics {
    epochs_completed: AtomicU64,
    participants_dispatched: AtomicU64,
    responses_rejected: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    evaluator_calls: AtomicU64,
    evaluator_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub epochs_completed: u64,
    pub participants_dispatched: u64,
    pub responses_rejected: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub evaluator_calls: u64,
    pub evaluator_failures: u64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            epochs_completed: AtomicU64::new(0),
            participants_dispatched: AtomicU64::new(0),
            responses_rejected: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            evaluator_calls: AtomicU64::new(0),
            evaluator_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_epochs_completed(&self) {
        self.epochs_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "epochs_completed", "counter incremented");
    }

    pub fn add_participants_dispatched(&self, n: u64) {
        self.participants_dispatched.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "participants_dispatched", n, "counter incremented");
    }

    pub fn inc_responses_rejected(&self) {
        self.responses_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "responses_rejected", "counter incremented");
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_hits", "counter incremented");
    }

    pub fn inc_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_misses", "counter incremented");
    }

    pub fn inc_evaluator_calls(&self) {
        self.evaluator_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluator_calls", "counter incremented");
    }

    pub fn inc_evaluator_failures(&self) {
        self.evaluator_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluator_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            epochs_completed = s.epochs_completed,
            participants_dispatched = s.participants_dispatched,
            responses_rejected = s.responses_rejected,
            cache_hits = s.cache_hits,
            cache_misses = s.cache_misses,
            evaluator_calls = s.evaluator_calls,
            evaluator_failures = s.evaluator_failures,
        );
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            epochs_completed: self.epochs_completed.load(Ordering::Relaxed),
            participants_dispatched: self.participants_dispatched.load(Ordering::Relaxed),
            responses_rejected: self.responses_rejected.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            evaluator_calls: self.evaluator_calls.load(Ordering::Relaxed),
            evaluator_failures: self.evaluator_failures.load(Ordering::Relaxed),
        }
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn evaluator_calls(&self) -> u64 {
        self.evaluator_calls.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.epochs_completed.store(0, Ordering::Relaxed);
        self.participants_dispatched.store(0, Ordering::Relaxed);
        self.responses_rejected.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.evaluator_calls.store(0, Ordering::Relaxed);
        self.evaluator_failures.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.cache_hits(), 0);
        m.inc_cache_hits();
        m.inc_cache_hits();
        m.inc_cache_misses();
        m.add_participants_dispatched(5);
        m.inc_evaluator_calls();

        let s = m.snapshot();
        assert_eq!(s.cache_hits, 2);
        assert_eq!(s.cache_misses, 1);
        assert_eq!(s.participants_dispatched, 5);
        assert_eq!(s.evaluator_calls, 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_epochs_completed();
        m.inc_responses_rejected();
        m.inc_evaluator_failures();
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }
}
