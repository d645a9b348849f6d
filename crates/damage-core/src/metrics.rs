//! Process-wide analysis counters.
//!
//! Incremented silently by the pipeline; [`Metrics::flush`] emits the current
//! values as one `info!` event (the CLI does this on exit).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::AnalysisErrorKind;

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    analyses_completed: AtomicU64,
    analyses_failed: AtomicU64,
    damage_detected: AtomicU64,
    client_faults: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            analyses_completed: AtomicU64::new(0),
            analyses_failed: AtomicU64::new(0),
            damage_detected: AtomicU64::new(0),
            client_faults: AtomicU64::new(0),
        }
    }

    pub fn record_completed(&self, damage_detected: bool) {
        self.analyses_completed.fetch_add(1, Ordering::Relaxed);
        if damage_detected {
            self.damage_detected.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(metric = "analyses_completed", "counter incremented");
    }

    pub fn record_failed(&self, kind: AnalysisErrorKind) {
        self.analyses_failed.fetch_add(1, Ordering::Relaxed);
        if kind.is_client_fault() {
            self.client_faults.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(metric = "analyses_failed", kind = %kind, "counter incremented");
    }

    /// Log the current counters as one `flush` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            analyses_completed = self.analyses_completed(),
            analyses_failed = self.analyses_failed(),
            damage_detected = self.damage_detected(),
            client_faults = self.client_faults(),
        );
    }

    /// Analyses that produced a result.
    pub fn analyses_completed(&self) -> u64 {
        self.analyses_completed.load(Ordering::Relaxed)
    }

    /// Analyses that ended in an error, of any kind.
    pub fn analyses_failed(&self) -> u64 {
        self.analyses_failed.load(Ordering::Relaxed)
    }

    /// Completed analyses that reported damage.
    pub fn damage_detected(&self) -> u64 {
        self.damage_detected.load(Ordering::Relaxed)
    }

    /// Failures caused by the submitted input (decode, unsupported format).
    pub fn client_faults(&self) -> u64 {
        self.client_faults.load(Ordering::Relaxed)
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.analyses_completed.store(0, Ordering::Relaxed);
        self.analyses_failed.store(0, Ordering::Relaxed);
        self.damage_detected.store(0, Ordering::Relaxed);
        self.client_faults.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_outcomes() {
        let m = Metrics::new();
        m.record_completed(true);
        m.record_completed(false);
        m.record_failed(AnalysisErrorKind::Decode);
        m.record_failed(AnalysisErrorKind::ModelUnavailable);

        assert_eq!(m.analyses_completed(), 2);
        assert_eq!(m.damage_detected(), 1);
        assert_eq!(m.analyses_failed(), 2);
        assert_eq!(m.client_faults(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.record_completed(true);
        m.record_failed(AnalysisErrorKind::Inference);
        m.reset();
        assert_eq!(m.analyses_completed(), 0);
        assert_eq!(m.analyses_failed(), 0);
        assert_eq!(m.damage_detected(), 0);
        assert_eq!(m.client_faults(), 0);
    }
}
