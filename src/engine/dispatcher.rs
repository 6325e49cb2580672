use log::{debug, info, trace, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::LiveSettings;
use crate::core::{DispatchBatch, DispatchRecord, RawSample, ThresholdEvent, ThresholdState};
use crate::error::{SinkError, TransportError};
use crate::nodes::{FilterEngine, ThresholdEngine};
use crate::observability::PipelineMetrics;
use crate::resilience::{DeliveryOutcome, GuardedSink, SinkPolicy};
use crate::sinks::Sink;

/// A sink that rejected a batch during one cycle
#[derive(Debug)]
pub struct SinkFailure {
    pub sink: &'static str,
    pub error: SinkError,
    /// First failure since the sink last succeeded
    pub first_in_streak: bool,
}

/// What one dispatch cycle produced
#[derive(Debug)]
pub struct DispatchReport {
    pub batch: DispatchBatch,
    pub failures: Vec<SinkFailure>,
}

/// Final state of a closed durable log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSummary {
    pub path: PathBuf,
    pub rows: u64,
}

struct LogSession {
    sink: GuardedSink,
    path: PathBuf,
    rows: u64,
}

/// Runs filter and threshold per channel and fans the batch out to the
/// sinks in a fixed order: log, telemetry, display.
///
/// Owns all per-channel state. Lives on the acquisition task only.
pub struct Dispatcher {
    filter: FilterEngine,
    threshold: ThresholdEngine,
    log: Option<LogSession>,
    telemetry: Option<GuardedSink>,
    display: Option<GuardedSink>,
    metrics: Arc<PipelineMetrics>,
    sequence: u64,
}

impl Dispatcher {
    pub fn new(metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            filter: FilterEngine::new(),
            threshold: ThresholdEngine::new(),
            log: None,
            telemetry: None,
            display: None,
            metrics,
            sequence: 0,
        }
    }

    pub fn with_telemetry(mut self, sink: Box<dyn Sink>) -> Self {
        self.telemetry = Some(GuardedSink::new(sink, self.metrics.clone(), SinkPolicy::Continue));
        self
    }

    /// A display consumer that went away is not retried
    pub fn with_display(mut self, sink: Box<dyn Sink>) -> Self {
        self.display = Some(GuardedSink::new(
            sink,
            self.metrics.clone(),
            SinkPolicy::DisableAfter { consecutive: 1 },
        ));
        self
    }

    /// Attach a durable log. Returns the summary of the log it replaces, if any.
    pub async fn set_log_sink(
        &mut self,
        sink: Box<dyn Sink>,
        path: PathBuf,
    ) -> Option<(LogSummary, Result<(), SinkError>)> {
        let previous = self.close_log_sink().await;
        self.log = Some(LogSession {
            sink: GuardedSink::new(sink, self.metrics.clone(), SinkPolicy::Continue),
            path,
            rows: 0,
        });
        previous
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log.as_ref().map(|session| session.path.as_path())
    }

    pub fn is_logging(&self) -> bool {
        self.log.is_some()
    }

    /// Flush and close the durable log, if one is open
    pub async fn close_log_sink(&mut self) -> Option<(LogSummary, Result<(), SinkError>)> {
        let mut session = self.log.take()?;
        let result = session.sink.close().await;
        let summary = LogSummary {
            path: session.path,
            rows: session.rows,
        };
        info!("logging stopped: {} rows in {}", summary.rows, summary.path.display());
        Some((summary, result))
    }

    /// Close every sink. The log summary is returned so the caller can
    /// report it after the file is flushed.
    pub async fn close_sinks(&mut self) -> Option<(LogSummary, Result<(), SinkError>)> {
        let summary = self.close_log_sink().await;
        for sink in [self.telemetry.as_mut(), self.display.as_mut()].into_iter().flatten() {
            if let Err(e) = sink.close().await {
                debug!("closing {} sink: {}", sink.name(), e);
            }
        }
        summary
    }

    /// Filter and classify every present channel.
    ///
    /// Thresholds are evaluated on the filtered voltage, which equals the
    /// true voltage when filtering is off for the channel.
    pub fn build_batch(&mut self, sample: &RawSample, settings: &LiveSettings) -> DispatchBatch {
        let mut records = Vec::with_capacity(sample.channel_count());

        for (channel, reading) in sample.channels() {
            let channel_settings = &settings.channels[channel];
            let filtered = self.filter.update(channel, reading.voltage, &channel_settings.filter);
            let event = self.threshold.evaluate(channel, filtered, &channel_settings.threshold);

            if let Some(event) = &event {
                self.metrics.record_alert();
                info!("{}", alert_message(event));
            }

            records.push(DispatchRecord {
                channel,
                raw: reading.raw,
                voltage: reading.voltage,
                filtered_voltage: filtered,
                chosen_voltage: if settings.use_filtered_output {
                    filtered
                } else {
                    reading.voltage
                },
                event,
            });
        }

        let batch = DispatchBatch {
            sequence: self.sequence,
            received_at: sample.received_at,
            device_timestamp: sample.device_timestamp,
            records,
        };
        self.sequence += 1;
        batch
    }

    /// Process one sample and deliver it. A failing sink never stops
    /// delivery to the sinks after it.
    pub async fn dispatch(&mut self, sample: &RawSample, settings: &LiveSettings) -> DispatchReport {
        self.metrics.record_sample();
        let batch = self.build_batch(sample, settings);
        let mut failures = Vec::new();

        if let Some(session) = self.log.as_mut() {
            let outcome = session.sink.deliver(&batch).await;
            if outcome.is_delivered() {
                session.rows += 1;
                self.metrics.record_log_row();
            }
            collect_failure(session.sink.name(), outcome, &mut failures);
        }

        if settings.telemetry_enabled {
            if let Some(sink) = self.telemetry.as_mut() {
                let outcome = sink.deliver(&batch).await;
                collect_failure(sink.name(), outcome, &mut failures);
            }
        }

        if let Some(sink) = self.display.as_mut() {
            let outcome = sink.deliver(&batch).await;
            collect_failure(sink.name(), outcome, &mut failures);
        }

        DispatchReport { batch, failures }
    }

    /// Account for a fetch that produced no sample
    pub fn record_transport_error(&self, error: &TransportError) {
        match error {
            TransportError::Malformed(e) => {
                self.metrics.record_malformed();
                debug!("discarded frame: {}", e);
            }
            TransportError::Idle => trace!("no frame this cycle"),
            e if e.is_counted() => {
                self.metrics.record_error();
                warn!("{}", e);
            }
            e => {
                self.metrics.record_error();
                warn!("transport failure: {}", e);
            }
        }
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    pub fn threshold_state(&self, channel: usize) -> ThresholdState {
        self.threshold.state(channel)
    }

    /// Drop filter history and threshold state for a reconfigured channel
    pub fn reset_channel(&mut self, channel: usize) {
        self.filter.reset(channel);
        self.threshold.reset(channel);
    }

    pub fn log_rows(&self) -> u64 {
        self.log.as_ref().map(|session| session.rows).unwrap_or(0)
    }
}

fn collect_failure(sink: &'static str, outcome: DeliveryOutcome, failures: &mut Vec<SinkFailure>) {
    if let DeliveryOutcome::Failed {
        error,
        first_in_streak,
    } = outcome
    {
        failures.push(SinkFailure {
            sink,
            error,
            first_in_streak,
        });
    }
}

/// Operator-facing text for a threshold transition
pub fn alert_message(event: &ThresholdEvent) -> String {
    match (event.to, event.boundary) {
        (ThresholdState::High, Some(high)) => format!(
            "[ALERT] Channel {} HIGH: {:.3} V > {:.3} V",
            event.channel, event.value, high
        ),
        (ThresholdState::Low, Some(low)) => format!(
            "[ALERT] Channel {} LOW: {:.3} V < {:.3} V",
            event.channel, event.value, low
        ),
        _ => format!(
            "[ALERT] Channel {} {}: {:.3} V",
            event.channel,
            event.to.name().to_uppercase(),
            event.value
        ),
    }
}
