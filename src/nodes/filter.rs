use std::collections::VecDeque;

use crate::config::{FilterSettings, MAX_FILTER_WINDOW};
use crate::core::CHANNEL_COUNT;

/// Sliding-window mean over recent voltages, one history per channel.
///
/// History is kept whether or not filtering is enabled, up to the largest
/// supported window, so enabling a filter mid-run starts warm.
#[derive(Debug, Clone)]
pub struct FilterEngine {
    history: [VecDeque<f64>; CHANNEL_COUNT],
}

impl FilterEngine {
    pub fn new() -> Self {
        Self {
            history: std::array::from_fn(|_| VecDeque::with_capacity(MAX_FILTER_WINDOW)),
        }
    }

    /// Record `voltage` and return the filtered value for `channel`.
    ///
    /// Disabled filters return the input unchanged. Enabled filters average
    /// the last `min(window, history)` readings, so output is available from
    /// the first sample.
    pub fn update(&mut self, channel: usize, voltage: f64, settings: &FilterSettings) -> f64 {
        let Some(history) = self.history.get_mut(channel) else {
            return voltage;
        };

        history.push_back(voltage);
        while history.len() > MAX_FILTER_WINDOW {
            history.pop_front();
        }

        if !settings.enabled {
            return voltage;
        }

        let window = settings.effective_window().min(history.len());
        let sum: f64 = history.iter().rev().take(window).sum();
        sum / window as f64
    }

    pub fn history_len(&self, channel: usize) -> usize {
        self.history.get(channel).map(VecDeque::len).unwrap_or(0)
    }

    /// Forget history for one channel, e.g. after the sensor on it changed
    pub fn reset(&mut self, channel: usize) {
        if let Some(history) = self.history.get_mut(channel) {
            history.clear();
        }
    }
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::new()
    }
}
