use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{MetricsSnapshot, PipelineMetrics};

/// Turns raw counters into the operator-facing rate statistic
pub struct StatsMonitor {
    metrics: Arc<PipelineMetrics>,
    started_at: Instant,
}

impl StatsMonitor {
    pub fn new(metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            metrics,
            started_at: Instant::now(),
        }
    }

    /// Restart the rate window, e.g. when acquisition (re)starts
    pub fn reset_clock(&mut self) {
        self.started_at = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Samples per second since the clock was started
    pub fn rate(&self) -> f64 {
        Self::rate_of(self.metrics.samples(), self.elapsed())
    }

    pub fn rate_of(samples: u64, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        samples as f64 / secs
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn generate_report(&self) -> String {
        Self::format_report(&self.snapshot(), self.elapsed())
    }

    pub fn format_report(snapshot: &MetricsSnapshot, elapsed: Duration) -> String {
        let mut report = format!(
            "Samples: {} | Errors: {} | Rate: {:.1} Hz",
            snapshot.samples,
            snapshot.errors,
            Self::rate_of(snapshot.samples, elapsed)
        );
        if snapshot.malformed > 0 {
            report.push_str(&format!(" | Malformed: {}", snapshot.malformed));
        }
        if snapshot.sink_failures > 0 {
            report.push_str(&format!(
                " | Sink failure{}: {}",
                if snapshot.sink_failures == 1 { "" } else { "s" },
                snapshot.sink_failures
            ));
        }
        if snapshot.log_rows > 0 {
            report.push_str(&format!(" | Logged: {}", snapshot.log_rows));
        }
        report
    }
}
