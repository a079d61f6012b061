//! Process-wide metric registry.
//!
//! Per the workspace's design notes, exactly two items are process-wide
//! mutable state: the instance ID used for workflow-ownership claims (see
//! `ontology_engine::ownership_guard`) and this metric registry. Both are
//! initialized once at boot and are read-only (append-only counters)
//! thereafter — no global config, no ambient request context.
//!
//! This is a minimal counter/gauge registry, not a full metrics facade; a
//! binary embedding the engine is free to additionally wire these into
//! whatever metrics exporter it uses.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// A small set of named counters and gauges tracking workflow-engine
/// activity across the process's lifetime.
///
/// All fields use relaxed atomics: these are observability counters, not
/// synchronization primitives, so ordering with respect to other memory
/// operations is not required.
#[derive(Debug, Default)]
pub struct Metrics {
    pub candidates_collected: AtomicU64,
    pub candidates_accepted: AtomicU64,
    pub candidates_rejected: AtomicU64,
    pub candidates_needs_review: AtomicU64,
    pub llm_calls_total: AtomicU64,
    pub llm_calls_failed: AtomicU64,
    pub workflows_completed: AtomicU64,
    pub workflows_failed: AtomicU64,
    pub workflows_cancelled: AtomicU64,
    pub ownership_claims_succeeded: AtomicU64,
    pub ownership_claims_rejected: AtomicU64,
    /// Number of workflows currently owned by this process, used as a
    /// liveness signal rather than a monotonic counter.
    pub active_workflows: AtomicI64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            candidates_collected: AtomicU64::new(0),
            candidates_accepted: AtomicU64::new(0),
            candidates_rejected: AtomicU64::new(0),
            candidates_needs_review: AtomicU64::new(0),
            llm_calls_total: AtomicU64::new(0),
            llm_calls_failed: AtomicU64::new(0),
            workflows_completed: AtomicU64::new(0),
            workflows_failed: AtomicU64::new(0),
            workflows_cancelled: AtomicU64::new(0),
            ownership_claims_succeeded: AtomicU64::new(0),
            ownership_claims_rejected: AtomicU64::new(0),
            active_workflows: AtomicI64::new(0),
        }
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// The process-wide registry. Initialized at first access; every field
/// starts at zero and is only ever incremented/decremented, never reset.
pub static METRICS: Metrics = Metrics::new();

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn counters_start_at_zero() {
        let m = Metrics::new();
        assert_eq!(m.candidates_collected.load(Ordering::Relaxed), 0);
        assert_eq!(m.active_workflows.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn incr_increments_by_one() {
        let m = Metrics::new();
        Metrics::incr(&m.llm_calls_total);
        Metrics::incr(&m.llm_calls_total);
        assert_eq!(m.llm_calls_total.load(Ordering::Relaxed), 2);
    }
}
