use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::dispatcher::{Dispatcher, LogSummary};
use super::scheduler::Pacer;
use super::state::RuntimeStatus;
use crate::config::{AcquisitionConfig, LiveSettings, SettingsHandle};
use crate::core::{RawSample, ThresholdEvent};
use crate::error::{ConfigError, SinkError, TransportError};
use crate::hal::{ConnectivityEvent, ManagedTransport, Transport, TransportRegistry};
use crate::observability::{MetricsSnapshot, PipelineMetrics};
use crate::sinks::{display_channel, CsvLogSink, DisplayReceiver, OscTelemetrySink, Sink};

/// Requests from the operator side to the acquisition task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCommand {
    StartLogging { base_name: String },
    StopLogging,
}

/// Notifications from the acquisition task to the operator side
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// Emitted once per connectivity edge
    ConnectionChanged(bool),
    Error(String),
    Alert(ThresholdEvent),
    LoggingStarted { path: PathBuf },
    /// Sent only after the log file was flushed and closed
    LoggingStopped { rows: u64, path: PathBuf },
    Stopped,
}

/// Shared stop flag plus a wake-up for whatever the task is awaiting
#[derive(Debug)]
struct StopSignal {
    running: AtomicBool,
    wake: Notify,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            wake: Notify::new(),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        // Stores a permit if the task is not currently waiting
        self.wake.notify_one();
    }
}

/// Events beyond this many undrained ones are dropped, newest first
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

fn send_event(events: &Sender<RuntimeEvent>, event: RuntimeEvent) {
    if let Err(TrySendError::Full(event)) = events.try_send(event) {
        debug!("event queue full, dropping {:?}", event);
    }
}

type SharedStatus = Arc<Mutex<RuntimeStatus>>;

fn set_status(status: &SharedStatus, target: RuntimeStatus) {
    let mut current = status.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if *current == target {
        return;
    }
    if current.can_transition_to(&target) {
        debug!("runtime {} -> {}", current.name(), target.name());
        *current = target;
    } else {
        warn!("ignoring runtime transition {} -> {}", current.name(), target.name());
    }
}

/// AcquisitionRuntime owns one acquisition run: transport, pacing, filter,
/// threshold and sinks, all on a single background task.
///
/// The operator side talks to it through `SettingsHandle` (live values),
/// `RuntimeCommand` (logging control) and `RuntimeEvent` (notifications),
/// and reads dispatched batches from the `DisplayReceiver` returned by
/// `start`.
pub struct AcquisitionRuntime {
    config: AcquisitionConfig,
    settings: SettingsHandle,
    registry: TransportRegistry,

    /// Used instead of the configured transport on the next start
    transport_override: Option<Box<dyn Transport>>,

    /// Used instead of the OSC publisher on the next start
    telemetry_override: Option<Box<dyn Sink>>,

    metrics: Arc<PipelineMetrics>,
    status: SharedStatus,
    stop_signal: Option<Arc<StopSignal>>,
    task: Option<JoinHandle<()>>,

    command_tx: Sender<RuntimeCommand>,
    command_rx: Receiver<RuntimeCommand>,
    event_tx: Sender<RuntimeEvent>,
    event_rx: Receiver<RuntimeEvent>,
}

impl AcquisitionRuntime {
    pub fn new(config: AcquisitionConfig) -> Self {
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = bounded(EVENT_QUEUE_CAPACITY);
        Self {
            settings: SettingsHandle::new(config.live_settings()),
            config,
            registry: TransportRegistry::with_defaults(),
            transport_override: None,
            telemetry_override: None,
            metrics: Arc::new(PipelineMetrics::new()),
            status: Arc::new(Mutex::new(RuntimeStatus::Stopped)),
            stop_signal: None,
            task: None,
            command_tx,
            command_rx,
            event_tx,
            event_rx,
        }
    }

    pub fn with_registry(mut self, registry: TransportRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport_override = Some(transport);
        self
    }

    pub fn with_telemetry_sink(mut self, sink: Box<dyn Sink>) -> Self {
        self.telemetry_override = Some(sink);
        self
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Live settings shared with the acquisition task
    pub fn settings(&self) -> SettingsHandle {
        self.settings.clone()
    }

    pub fn commands(&self) -> Sender<RuntimeCommand> {
        self.command_tx.clone()
    }

    pub fn events(&self) -> Receiver<RuntimeEvent> {
        self.event_rx.clone()
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.metrics.clone()
    }

    pub fn stats(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn status(&self) -> RuntimeStatus {
        *self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|task| !task.is_finished()).unwrap_or(false)
    }

    pub fn start_logging(&self, base_name: impl Into<String>) -> Result<()> {
        self.command_tx
            .send(RuntimeCommand::StartLogging {
                base_name: base_name.into(),
            })
            .map_err(|e| anyhow!("command channel closed: {}", e))
    }

    pub fn stop_logging(&self) -> Result<()> {
        self.command_tx
            .send(RuntimeCommand::StopLogging)
            .map_err(|e| anyhow!("command channel closed: {}", e))
    }

    /// Connect the transport and spawn the acquisition task.
    ///
    /// A missing transport or a failed connect is reported both as events
    /// (`ConnectionChanged(false)` then `Error`) and as the returned error.
    pub async fn start(&mut self) -> Result<DisplayReceiver> {
        if self.is_running() {
            return Err(anyhow!("Acquisition is already running"));
        }
        // Reap a task that ended on its own
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.metrics.reset();
        set_status(&self.status, RuntimeStatus::Connecting);

        let transport = match self.build_transport() {
            Ok(transport) => transport,
            Err(e) => {
                // No connect attempt was made, so there is no tracked edge
                self.emit(RuntimeEvent::ConnectionChanged(false));
                self.fail_start(&e);
                return Err(e);
            }
        };

        let mut transport = ManagedTransport::new(transport);
        let (result, edge) = transport.connect().await;
        self.emit_edge(edge);
        if let Err(e) = result {
            let e = anyhow::Error::new(e).context(format!("connecting to {}", transport.endpoint()));
            self.fail_start(&e);
            return Err(e);
        }

        let (display_sink, display_rx) = display_channel(self.config.display_capacity);
        let mut dispatcher = Dispatcher::new(self.metrics.clone()).with_display(Box::new(display_sink));
        if let Some(telemetry) = self.build_telemetry().await {
            dispatcher = dispatcher.with_telemetry(telemetry);
        }

        if let Some(base_name) = self.config.logging.base_name.clone() {
            self.command_tx
                .send(RuntimeCommand::StartLogging { base_name })
                .map_err(|e| anyhow!("command channel closed: {}", e))?;
        }

        let stop_signal = Arc::new(StopSignal::new());
        let task = AcquisitionTask {
            transport,
            dispatcher,
            settings: self.settings.clone(),
            stop: stop_signal.clone(),
            commands: self.command_rx.clone(),
            events: self.event_tx.clone(),
            status: self.status.clone(),
            log_directory: self.config.logging.directory.clone(),
        };

        set_status(&self.status, RuntimeStatus::Running);
        self.stop_signal = Some(stop_signal);
        self.task = Some(tokio::spawn(task.run()));
        info!("acquisition started at {} Hz", self.settings.snapshot().sample_rate_hz);

        Ok(display_rx)
    }

    /// Stop the acquisition task and wait for it to release the transport
    /// and flush the log.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(signal) = self.stop_signal.take() {
            signal.stop();
        }
        if let Some(task) = self.task.take() {
            task.await.context("acquisition task panicked")?;
        }
        set_status(&self.status, RuntimeStatus::Stopped);
        Ok(())
    }

    fn build_transport(&mut self) -> Result<Box<dyn Transport>> {
        if let Some(transport) = self.transport_override.take() {
            return Ok(transport);
        }
        let config = self.config.transport.as_ref().ok_or(ConfigError::NoTransport)?;
        self.registry.create(config).context("building transport")
    }

    async fn build_telemetry(&mut self) -> Option<Box<dyn Sink>> {
        if let Some(sink) = self.telemetry_override.take() {
            return Some(sink);
        }
        let telemetry = &self.config.telemetry;
        if !telemetry.enabled {
            return None;
        }
        match OscTelemetrySink::connect(&telemetry.host, telemetry.port).await {
            Ok(sink) => Some(Box::new(sink)),
            Err(e) => {
                warn!("telemetry unavailable: {}", e);
                self.emit(RuntimeEvent::Error(e.to_string()));
                None
            }
        }
    }

    fn fail_start(&self, e: &anyhow::Error) {
        error!("{:#}", e);
        self.emit(RuntimeEvent::Error(format!("{:#}", e)));
        set_status(&self.status, RuntimeStatus::Error);
    }

    fn emit_edge(&self, edge: Option<ConnectivityEvent>) {
        if let Some(edge) = edge {
            self.emit(RuntimeEvent::ConnectionChanged(edge.connected));
        }
    }

    fn emit(&self, event: RuntimeEvent) {
        send_event(&self.event_tx, event);
    }
}

/// Note: dropping a running runtime only signals the task to stop; call
/// `stop()` to wait for the transport and log to be closed.
impl Drop for AcquisitionRuntime {
    fn drop(&mut self) {
        if let Some(signal) = &self.stop_signal {
            signal.stop();
        }
    }
}

/// State moved onto the acquisition task
struct AcquisitionTask {
    transport: ManagedTransport,
    dispatcher: Dispatcher,
    settings: SettingsHandle,
    stop: Arc<StopSignal>,
    commands: Receiver<RuntimeCommand>,
    events: Sender<RuntimeEvent>,
    status: SharedStatus,
    log_directory: PathBuf,
}

impl AcquisitionTask {
    async fn run(mut self) {
        let mut pacer = Pacer::new(self.settings.snapshot().interval());

        'acquire: while self.stop.is_running() {
            self.handle_commands().await;

            let settings = self.settings.snapshot();
            pacer.set_interval(settings.interval());

            if pacer.until_next(Instant::now()).is_some() {
                tokio::select! {
                    _ = pacer.wait() => {}
                    _ = self.stop.wake.notified() => {}
                }
                continue;
            }

            let (result, edge) = tokio::select! {
                outcome = self.transport.fetch_one() => outcome,
                _ = self.stop.wake.notified() => continue,
            };
            pacer.advance(Instant::now());

            if let Some(edge) = edge {
                self.emit(RuntimeEvent::ConnectionChanged(edge.connected));
            }
            if !self.handle_outcome(result, &settings).await {
                break;
            }

            // Everything the device already sent goes out on this tick
            while let Some(result) = self.transport.try_next() {
                if !self.handle_outcome(result, &settings).await {
                    break 'acquire;
                }
            }
        }

        self.shutdown().await;
    }

    /// Dispatch a sample or account for a failed fetch. Returns false once
    /// the run has to end.
    async fn handle_outcome(&mut self, result: Result<RawSample, TransportError>, settings: &LiveSettings) -> bool {
        match result {
            Ok(sample) => {
                let report = self.dispatcher.dispatch(&sample, settings).await;
                for event in report.batch.events() {
                    self.emit(RuntimeEvent::Alert(*event));
                }
                for failure in report.failures.into_iter().filter(|f| f.first_in_streak) {
                    self.emit(RuntimeEvent::Error(failure.error.to_string()));
                }
                true
            }
            Err(e) if e.is_transient() => {
                self.dispatcher.record_transport_error(&e);
                true
            }
            Err(e) => {
                self.dispatcher.record_transport_error(&e);
                error!("acquisition stopped: {}", e);
                self.emit(RuntimeEvent::Error(e.to_string()));
                set_status(&self.status, RuntimeStatus::Error);
                false
            }
        }
    }

    async fn handle_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                RuntimeCommand::StartLogging { base_name } => self.start_logging(&base_name).await,
                RuntimeCommand::StopLogging => {
                    if let Some(closed) = self.dispatcher.close_log_sink().await {
                        self.report_log_closed(closed);
                    }
                }
            }
        }
    }

    async fn start_logging(&mut self, base_name: &str) {
        match CsvLogSink::create(&self.log_directory, base_name).await {
            Ok(sink) => {
                let path = sink.path().to_path_buf();
                if let Some(previous) = self.dispatcher.set_log_sink(Box::new(sink), path.clone()).await {
                    self.report_log_closed(previous);
                }
                self.emit(RuntimeEvent::LoggingStarted { path });
            }
            Err(e) => {
                error!("cannot start logging: {}", e);
                self.emit(RuntimeEvent::Error(e.to_string()));
            }
        }
    }

    fn report_log_closed(&self, (summary, result): (LogSummary, Result<(), SinkError>)) {
        if let Err(e) = result {
            self.emit(RuntimeEvent::Error(e.to_string()));
        }
        self.emit(RuntimeEvent::LoggingStopped {
            rows: summary.rows,
            path: summary.path,
        });
    }

    async fn shutdown(&mut self) {
        let (result, edge) = self.transport.close().await;
        if let Err(e) = result {
            debug!("closing transport: {}", e);
        }
        if let Some(edge) = edge {
            self.emit(RuntimeEvent::ConnectionChanged(edge.connected));
        }

        if let Some(closed) = self.dispatcher.close_sinks().await {
            self.report_log_closed(closed);
        }

        info!("acquisition stopped after {} samples", self.dispatcher.metrics().samples());
        self.emit(RuntimeEvent::Stopped);
    }

    fn emit(&self, event: RuntimeEvent) {
        send_event(&self.events, event);
    }
}
