use chrono::{DateTime, Local};
use log::debug;
use serde_json::Value;

use crate::error::MalformedFrameError;

/// Number of analog channels on the device. Fixed for the lifetime of a run.
pub const CHANNEL_COUNT: usize = 4;

/// One channel's reading within a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelReading {
    /// Unconverted ADC count
    pub raw: i64,

    /// Device-side converted voltage
    pub voltage: f64,
}

/// One observation cycle from the device.
///
/// Channels missing from the device frame stay `None`; they mean "no reading
/// this cycle", never zero.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    /// Local receipt time
    pub received_at: DateTime<Local>,

    /// Timestamp reported by the device, if it sent one
    pub device_timestamp: Option<f64>,

    channels: [Option<ChannelReading>; CHANNEL_COUNT],
}

impl RawSample {
    pub fn new(received_at: DateTime<Local>, device_timestamp: Option<f64>) -> Self {
        Self {
            received_at,
            device_timestamp,
            channels: [None; CHANNEL_COUNT],
        }
    }

    /// Builder-style helper, mostly for tests and mock transports.
    /// Indices outside the channel range are ignored.
    pub fn with_channel(mut self, channel: usize, raw: i64, voltage: f64) -> Self {
        if let Some(slot) = self.channels.get_mut(channel) {
            *slot = Some(ChannelReading { raw, voltage });
        }
        self
    }

    pub fn channel(&self, channel: usize) -> Option<&ChannelReading> {
        self.channels.get(channel).and_then(|c| c.as_ref())
    }

    /// Present channels in index order
    pub fn channels(&self) -> impl Iterator<Item = (usize, &ChannelReading)> {
        self.channels
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|r| (i, r)))
    }

    pub fn channel_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_some()).count()
    }

    /// Parse a device payload such as
    /// `{"timestamp": 1234, "channels": {"0": {"raw": 1023, "voltage": 0.51}}}`.
    pub fn from_json_str(text: &str) -> Result<Self, MalformedFrameError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| MalformedFrameError::InvalidJson(e.to_string()))?;
        Self::from_value(&value, Local::now())
    }

    pub fn from_value(
        value: &Value,
        received_at: DateTime<Local>,
    ) -> Result<Self, MalformedFrameError> {
        let object = value.as_object().ok_or(MalformedFrameError::NotAFrame)?;
        let channels = object
            .get("channels")
            .and_then(Value::as_object)
            .ok_or(MalformedFrameError::MissingChannels)?;

        let device_timestamp = object.get("timestamp").and_then(as_f64);
        let mut sample = Self::new(received_at, device_timestamp);

        for (key, entry) in channels {
            let index = match key.parse::<usize>() {
                Ok(i) if i < CHANNEL_COUNT => i,
                _ => {
                    debug!("ignoring unknown channel key {:?}", key);
                    continue;
                }
            };

            match parse_channel(key, entry) {
                Ok(reading) => sample.channels[index] = Some(reading),
                Err(e) => debug!("skipping channel: {}", e),
            }
        }

        Ok(sample)
    }
}

fn parse_channel(key: &str, entry: &Value) -> Result<ChannelReading, MalformedFrameError> {
    let bad = |reason: &str| MalformedFrameError::BadChannel {
        channel: key.to_string(),
        reason: reason.to_string(),
    };

    let raw = entry.get("raw").ok_or_else(|| bad("missing raw"))?;
    let voltage = entry.get("voltage").ok_or_else(|| bad("missing voltage"))?;

    // Serial firmware builds have been seen sending numbers as strings.
    let raw = match raw {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| bad("raw is not an integer"))?;

    let voltage = as_f64(voltage).ok_or_else(|| bad("voltage is not a number"))?;

    Ok(ChannelReading { raw, voltage })
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
