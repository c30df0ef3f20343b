//! Engine-level counters, exposed for the embedder to read or log.
//!
//! No OpenTelemetry exporter wiring lives here — there's no collector in
//! scope for this crate to export to — but the counters follow the same
//! `AtomicU64` style as [`nebula_eventbus::EventBus`]'s own `emitted`
//! counter, so an embedder can wire them into whatever exporter it has.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters tracking engine activity across its lifetime.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    nodes_executed: AtomicU64,
    nodes_failed: AtomicU64,
    jobs_enqueued: AtomicU64,
    jobs_completed: AtomicU64,
}

/// Point-in-time read of [`EngineMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub nodes_executed: u64,
    pub nodes_failed: u64,
    pub jobs_enqueued: u64,
    pub jobs_completed: u64,
}

impl EngineMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_node_executed(&self) {
        self.nodes_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_node_failed(&self) {
        self.nodes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_enqueued(&self) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            nodes_executed: self.nodes_executed.load(Ordering::Relaxed),
            nodes_failed: self.nodes_failed.load(Ordering::Relaxed),
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fresh_metrics_are_zero() {
        let metrics = EngineMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn counters_increment_independently() {
        let metrics = EngineMetrics::new();
        metrics.record_node_executed();
        metrics.record_node_executed();
        metrics.record_node_failed();
        metrics.record_job_enqueued();
        metrics.record_job_completed();

        let snap = metrics.snapshot();
        assert_eq!(snap.nodes_executed, 2);
        assert_eq!(snap.nodes_failed, 1);
        assert_eq!(snap.jobs_enqueued, 1);
        assert_eq!(snap.jobs_completed, 1);
    }
}
