use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::core::CHANNEL_COUNT;
use crate::error::ConfigError;

pub const MIN_FILTER_WINDOW: usize = 2;
pub const MAX_FILTER_WINDOW: usize = 50;
pub const MIN_SAMPLE_RATE_HZ: f64 = 0.1;
pub const MAX_SAMPLE_RATE_HZ: f64 = 1000.0;
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 5.0;

/// Moving-average settings for one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub enabled: bool,
    pub window: usize,
}

impl FilterSettings {
    /// Window clamped to the supported range
    pub fn effective_window(&self) -> usize {
        self.window.clamp(MIN_FILTER_WINDOW, MAX_FILTER_WINDOW)
    }
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            window: 5,
        }
    }
}

/// Threshold setpoints for one channel.
///
/// `low <= high` is not required; see `ThresholdEngine::classify`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub enabled: bool,
    pub high: f64,
    pub low: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            high: 1.0,
            low: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChannelSettings {
    pub filter: FilterSettings,
    pub threshold: ThresholdConfig,
}

/// Transport selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Poll `http://{host}/data` once per cycle
    Http {
        host: String,
        #[serde(default = "default_http_timeout_ms")]
        timeout_ms: u64,
    },
    /// Read newline-delimited JSON from a serial port
    Serial {
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        #[serde(default = "default_settle_ms")]
        settle_ms: u64,
        #[serde(default = "default_read_timeout_ms")]
        read_timeout_ms: u64,
    },
}

impl TransportConfig {
    pub fn http(host: impl Into<String>) -> Self {
        Self::Http {
            host: host.into(),
            timeout_ms: default_http_timeout_ms(),
        }
    }

    pub fn serial(port: impl Into<String>, baud_rate: u32) -> Self {
        Self::Serial {
            port: port.into(),
            baud_rate,
            settle_ms: default_settle_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

fn default_http_timeout_ms() -> u64 {
    2000
}

fn default_baud_rate() -> u32 {
    115_200
}

// ESP32 boards reset when the port opens
fn default_settle_ms() -> u64 {
    2000
}

fn default_read_timeout_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub host: String,
    pub port: u16,
    pub enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    /// Logging starts immediately when set
    pub base_name: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            base_name: None,
        }
    }
}

/// Full configuration for one acquisition run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub sample_rate_hz: f64,
    pub transport: Option<TransportConfig>,
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
    pub channels: [ChannelSettings; CHANNEL_COUNT],
    pub use_filtered_output: bool,
    pub display_capacity: usize,
    pub debug: bool,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            transport: None,
            telemetry: TelemetryConfig::default(),
            logging: LoggingConfig::default(),
            channels: [ChannelSettings::default(); CHANNEL_COUNT],
            use_filtered_output: false,
            display_capacity: 1000,
            debug: false,
        }
    }
}

impl AcquisitionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transport.is_none() {
            return Err(ConfigError::NoTransport);
        }
        validate_rate(self.sample_rate_hz)?;
        for (channel, settings) in self.channels.iter().enumerate() {
            let window = settings.filter.window;
            if !(MIN_FILTER_WINDOW..=MAX_FILTER_WINDOW).contains(&window) {
                return Err(ConfigError::InvalidWindow { channel, window });
            }
        }
        Ok(())
    }

    /// Settings the acquisition task re-reads every cycle
    pub fn live_settings(&self) -> LiveSettings {
        LiveSettings {
            sample_rate_hz: self.sample_rate_hz,
            channels: self.channels,
            use_filtered_output: self.use_filtered_output,
            telemetry_enabled: self.telemetry.enabled,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write via a temporary file and rename
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, json)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }
}

fn validate_rate(rate: f64) -> Result<(), ConfigError> {
    if !(MIN_SAMPLE_RATE_HZ..=MAX_SAMPLE_RATE_HZ).contains(&rate) {
        return Err(ConfigError::InvalidRate(rate));
    }
    Ok(())
}

/// Values that may change while the pipeline runs
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSettings {
    pub sample_rate_hz: f64,
    pub channels: [ChannelSettings; CHANNEL_COUNT],
    pub use_filtered_output: bool,
    pub telemetry_enabled: bool,
}

impl LiveSettings {
    /// Pacing interval. Out-of-range rates are clamped; NaN or infinite
    /// rates fall back to the default.
    pub fn interval(&self) -> Duration {
        let rate = if self.sample_rate_hz.is_finite() {
            self.sample_rate_hz.clamp(MIN_SAMPLE_RATE_HZ, MAX_SAMPLE_RATE_HZ)
        } else {
            DEFAULT_SAMPLE_RATE_HZ
        };
        Duration::from_secs_f64(1.0 / rate)
    }
}

impl Default for LiveSettings {
    fn default() -> Self {
        AcquisitionConfig::default().live_settings()
    }
}

/// Shared, lock-free handle to the live settings.
///
/// Readers get a whole `LiveSettings` snapshot; writers replace it
/// atomically, so a reader never observes a half-applied update.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    inner: Arc<ArcSwap<LiveSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: LiveSettings) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(settings)),
        }
    }

    pub fn snapshot(&self) -> Arc<LiveSettings> {
        self.inner.load_full()
    }

    pub fn update<F>(&self, f: F)
    where
        F: Fn(&mut LiveSettings),
    {
        self.inner.rcu(|current| {
            let mut next = LiveSettings::clone(current);
            f(&mut next);
            next
        });
    }

    pub fn set_sample_rate(&self, rate_hz: f64) -> Result<(), ConfigError> {
        validate_rate(rate_hz)?;
        self.update(|s| s.sample_rate_hz = rate_hz);
        Ok(())
    }

    pub fn set_filter(&self, channel: usize, filter: FilterSettings) -> Result<(), ConfigError> {
        if !(MIN_FILTER_WINDOW..=MAX_FILTER_WINDOW).contains(&filter.window) {
            return Err(ConfigError::InvalidWindow {
                channel,
                window: filter.window,
            });
        }
        self.update(|s| {
            if let Some(ch) = s.channels.get_mut(channel) {
                ch.filter = filter;
            }
        });
        Ok(())
    }

    pub fn set_threshold(&self, channel: usize, threshold: ThresholdConfig) {
        self.update(|s| {
            if let Some(ch) = s.channels.get_mut(channel) {
                ch.threshold = threshold;
            }
        });
    }

    pub fn set_use_filtered_output(&self, enabled: bool) {
        self.update(|s| s.use_filtered_output = enabled);
    }

    pub fn set_telemetry_enabled(&self, enabled: bool) {
        self.update(|s| s.telemetry_enabled = enabled);
    }
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(LiveSettings::default())
    }
}
