use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Hot-path counters for one acquisition run.
///
/// Written only from the acquisition task; anyone may read. Readers on other
/// threads can observe a slightly stale value.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    samples: AtomicU64,
    errors: AtomicU64,
    malformed: AtomicU64,
    sink_failures: AtomicU64,
    log_rows: AtomicU64,
    alerts: AtomicU64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every counter at the start of a run
    pub fn reset(&self) {
        for counter in [
            &self.samples,
            &self.errors,
            &self.malformed,
            &self.sink_failures,
            &self.log_rows,
            &self.alerts,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn record_sample(&self) {
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_log_row(&self) {
        self.log_rows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert(&self) {
        self.alerts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    pub fn sink_failures(&self) -> u64 {
        self.sink_failures.load(Ordering::Relaxed)
    }

    pub fn log_rows(&self) -> u64 {
        self.log_rows.load(Ordering::Relaxed)
    }

    pub fn alerts(&self) -> u64 {
        self.alerts.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            samples: self.samples(),
            errors: self.errors(),
            malformed: self.malformed(),
            sink_failures: self.sink_failures(),
            log_rows: self.log_rows(),
            alerts: self.alerts(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub samples: u64,
    pub errors: u64,
    pub malformed: u64,
    pub sink_failures: u64,
    pub log_rows: u64,
    pub alerts: u64,
}
