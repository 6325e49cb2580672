use crate::config::ThresholdConfig;
use crate::core::{ThresholdEvent, ThresholdState, CHANNEL_COUNT};

/// Per-channel High/Low/Normal classifier with transition events.
///
/// Events are raised against the last committed classification, so a value
/// hovering around one setpoint produces one event per real crossing rather
/// than one per sample.
#[derive(Debug, Clone, Default)]
pub struct ThresholdEngine {
    states: [ThresholdState; CHANNEL_COUNT],
}

impl ThresholdEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a value. `high` is tested before `low`, which decides the
    /// outcome when the setpoints are inverted.
    pub fn classify(value: f64, config: &ThresholdConfig) -> ThresholdState {
        if value > config.high {
            ThresholdState::High
        } else if value < config.low {
            ThresholdState::Low
        } else {
            ThresholdState::Normal
        }
    }

    /// Classify `value` for `channel` and return an event if the state changed.
    ///
    /// A disabled channel is left untouched. The first classification out of
    /// `Unset` is stored without an event.
    pub fn evaluate(
        &mut self,
        channel: usize,
        value: f64,
        config: &ThresholdConfig,
    ) -> Option<ThresholdEvent> {
        if !config.enabled {
            return None;
        }
        let slot = self.states.get_mut(channel)?;

        let next = Self::classify(value, config);
        let previous = *slot;
        if next == previous {
            return None;
        }
        *slot = next;

        if previous == ThresholdState::Unset {
            return None;
        }

        let boundary = match next {
            ThresholdState::High => Some(config.high),
            ThresholdState::Low => Some(config.low),
            _ => None,
        };

        Some(ThresholdEvent {
            channel,
            from: previous,
            to: next,
            value,
            boundary,
        })
    }

    pub fn state(&self, channel: usize) -> ThresholdState {
        self.states.get(channel).copied().unwrap_or_default()
    }

    /// Return a channel to `Unset`
    pub fn reset(&mut self, channel: usize) {
        if let Some(slot) = self.states.get_mut(channel) {
            *slot = ThresholdState::Unset;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(high: f64, low: f64) -> ThresholdConfig {
        ThresholdConfig { enabled: true, high, low }
    }

    #[test]
    fn test_inverted_setpoints_prefer_high() {
        let inverted = config(0.5, 2.0);
        // 1.0 is both above high and below low
        assert_eq!(ThresholdEngine::classify(1.0, &inverted), ThresholdState::High);
        assert_eq!(ThresholdEngine::classify(0.2, &inverted), ThresholdState::Low);
    }

    #[test]
    fn test_event_carries_boundary() {
        let mut engine = ThresholdEngine::new();
        let cfg = config(1.0, 0.1);
        assert!(engine.evaluate(2, 0.5, &cfg).is_none());

        let event = engine.evaluate(2, 1.5, &cfg).unwrap();
        assert_eq!(event.from, ThresholdState::Normal);
        assert_eq!(event.to, ThresholdState::High);
        assert_eq!(event.boundary, Some(1.0));

        let event = engine.evaluate(2, 0.7, &cfg).unwrap();
        assert_eq!(event.to, ThresholdState::Normal);
        assert_eq!(event.boundary, None);
    }

    #[test]
    fn test_reset_returns_to_unset() {
        let mut engine = ThresholdEngine::new();
        engine.evaluate(0, 5.0, &config(1.0, 0.1));
        assert_eq!(engine.state(0), ThresholdState::High);
        engine.reset(0);
        assert_eq!(engine.state(0), ThresholdState::Unset);
        assert!(engine.evaluate(0, 0.0, &config(1.0, 0.1)).is_none());
    }
}
