use adcbridge::config::{AcquisitionConfig, TransportConfig};
use adcbridge::engine::{AcquisitionRuntime, RuntimeEvent};
use adcbridge::error::ConfigError;
use adcbridge::hal::mock::SimulatedAdcTransport;
use adcbridge::hal::{push_device_settings, DeviceSettings};
use adcbridge::observability::StatsMonitor;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "adcbridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Poll the device over HTTP at this host
    #[arg(long = "host", conflicts_with = "serial")]
    host: Option<String>,

    /// Read the device over this serial port
    #[arg(long = "serial", value_name = "PORT")]
    serial: Option<String>,

    #[arg(long = "baud", default_value_t = 115200)]
    baud: u32,

    /// Sample rate in Hz
    #[arg(short = 'r', long = "rate")]
    rate: Option<f64>,

    /// Start logging to <NAME>.csv right away
    #[arg(short = 'l', long = "log", value_name = "NAME")]
    log: Option<String>,

    /// Directory for log files
    #[arg(long = "log-dir", value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Use a built-in sine generator instead of a device
    #[arg(long = "simulate", conflicts_with_all = ["host", "serial"])]
    simulate: bool,

    #[arg(long = "no-telemetry")]
    no_telemetry: bool,

    /// Seconds between stats reports
    #[arg(long = "stats-every", default_value_t = 5)]
    stats_every: u64,

    #[arg(short = 'd', long = "debug")]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send ADC mode and gain to the device and exit
    PushConfig {
        #[arg(long = "host")]
        host: String,

        #[arg(long = "mode", default_value = "single_ended")]
        mode: String,

        #[arg(long = "gain", default_value = "ONE")]
        gain: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AcquisitionConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => AcquisitionConfig::default(),
    };

    // RUST_LOG still overrides
    let log_level = if cli.debug || config.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if let Some(Command::PushConfig { host, mode, gain }) = &cli.command {
        let settings = DeviceSettings {
            mode: mode.clone(),
            gain: gain.clone(),
        };
        return push_device_settings(host, &settings).await;
    }

    apply_overrides(&mut config, &cli);
    if let Err(e) = config.validate() {
        if !(cli.simulate && matches!(e, ConfigError::NoTransport)) {
            return Err(e).context("invalid configuration");
        }
    }

    let mut runtime = AcquisitionRuntime::new(config.clone());
    if cli.simulate {
        runtime = runtime.with_transport(Box::new(SimulatedAdcTransport::new(0.5, config.sample_rate_hz)));
    }
    let events = runtime.events();

    let display = runtime.start().await?;
    let mut monitor = StatsMonitor::new(runtime.metrics());
    monitor.reset_clock();

    let mut poll = tokio::time::interval(Duration::from_millis(200));
    let mut report = tokio::time::interval(Duration::from_secs(cli.stats_every.max(1)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted, stopping");
                break;
            }
            _ = poll.tick() => {
                // Keep only what a live view would show: the newest batch
                let _latest = display.drain().pop();
                let mut finished = false;
                for event in events.try_iter() {
                    finished |= report_event(&event);
                }
                if finished {
                    break;
                }
            }
            _ = report.tick() => {
                info!("{}", monitor.generate_report());
            }
        }
    }

    runtime.stop().await?;
    for event in events.try_iter() {
        report_event(&event);
    }
    info!("{}", monitor.generate_report());
    Ok(())
}

fn apply_overrides(config: &mut AcquisitionConfig, cli: &Cli) {
    if let Some(host) = &cli.host {
        config.transport = Some(TransportConfig::http(host.clone()));
    }
    if let Some(port) = &cli.serial {
        config.transport = Some(TransportConfig::serial(port.clone(), cli.baud));
    }
    if let Some(rate) = cli.rate {
        config.sample_rate_hz = rate;
    }
    if let Some(name) = &cli.log {
        config.logging.base_name = Some(name.clone());
    }
    if let Some(dir) = &cli.log_dir {
        config.logging.directory = dir.clone();
    }
    if cli.no_telemetry {
        config.telemetry.enabled = false;
    }
    config.debug |= cli.debug;
}

/// Print an event; returns true once the acquisition task has ended
fn report_event(event: &RuntimeEvent) -> bool {
    match event {
        RuntimeEvent::ConnectionChanged(true) => info!("connected"),
        RuntimeEvent::ConnectionChanged(false) => warn!("disconnected"),
        RuntimeEvent::Error(message) => error!("{}", message),
        // Already logged by the dispatcher
        RuntimeEvent::Alert(_) => {}
        RuntimeEvent::LoggingStarted { path } => info!("logging to {}", path.display()),
        RuntimeEvent::LoggingStopped { rows, path } => {
            info!("log closed: {} rows in {}", rows, path.display())
        }
        RuntimeEvent::Stopped => return true,
    }
    false
}
