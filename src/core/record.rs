use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Per-channel threshold classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ThresholdState {
    /// No classification made yet
    #[default]
    Unset,
    High,
    Low,
    Normal,
}

impl ThresholdState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::High => "high",
            Self::Low => "low",
            Self::Normal => "normal",
        }
    }
}

/// A committed change of classification on one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdEvent {
    pub channel: usize,
    pub from: ThresholdState,
    pub to: ThresholdState,
    /// Value that caused the transition
    pub value: f64,
    /// Setpoint that was crossed; `None` when returning to Normal
    pub boundary: Option<f64>,
}

/// What the sinks receive for one channel in one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchRecord {
    pub channel: usize,
    pub raw: i64,
    pub voltage: f64,
    /// Equal to `voltage` when filtering is disabled
    pub filtered_voltage: f64,
    /// Voltage selected for output (filtered or true, per settings)
    pub chosen_voltage: f64,
    pub event: Option<ThresholdEvent>,
}

/// All records produced from one `RawSample`
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchBatch {
    pub sequence: u64,
    pub received_at: DateTime<Local>,
    pub device_timestamp: Option<f64>,
    pub records: Vec<DispatchRecord>,
}

impl DispatchBatch {
    pub fn record(&self, channel: usize) -> Option<&DispatchRecord> {
        self.records.iter().find(|r| r.channel == channel)
    }

    pub fn events(&self) -> impl Iterator<Item = &ThresholdEvent> {
        self.records.iter().filter_map(|r| r.event.as_ref())
    }
}
