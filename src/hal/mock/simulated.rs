use async_trait::async_trait;
use chrono::Local;
use std::f64::consts::PI;

use crate::core::{RawSample, CHANNEL_COUNT};
use crate::error::TransportError;
use crate::hal::{Transport, TransportHandle, TransportKind};

/// Full-scale voltage of the simulated 12-bit converter
const FULL_SCALE_V: f64 = 3.3;
const MAX_COUNT: f64 = 4095.0;

/// Generates slow sine waves on all four channels, phase-shifted per channel.
/// Lets the runner and demos work without hardware.
pub struct SimulatedAdcTransport {
    frequency_hz: f64,
    sample_rate_hz: f64,
}

impl SimulatedAdcTransport {
    pub fn new(frequency_hz: f64, sample_rate_hz: f64) -> Self {
        Self {
            frequency_hz,
            sample_rate_hz,
        }
    }
}

#[async_trait]
impl Transport for SimulatedAdcTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Mock
    }

    fn endpoint(&self) -> String {
        format!("sim://sine/{}Hz", self.frequency_hz)
    }

    async fn connect(&self) -> Result<Box<dyn TransportHandle>, TransportError> {
        Ok(Box::new(SimulatedHandle {
            delta_phase: 2.0 * PI * self.frequency_hz / self.sample_rate_hz.max(f64::EPSILON),
            phase: 0.0,
            frame_counter: 0,
            open: true,
        }))
    }
}

struct SimulatedHandle {
    delta_phase: f64,
    phase: f64,
    frame_counter: u64,
    open: bool,
}

#[async_trait]
impl TransportHandle for SimulatedHandle {
    async fn fetch_one(&mut self) -> Result<RawSample, TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }

        let mut sample = RawSample::new(Local::now(), Some(self.frame_counter as f64));
        for ch in 0..CHANNEL_COUNT {
            let offset = ch as f64 * PI / 2.0;
            let level = 0.5 + 0.5 * (self.phase + offset).sin();
            let raw = (level * MAX_COUNT).round();
            sample = sample.with_channel(ch, raw as i64, raw / MAX_COUNT * FULL_SCALE_V);
        }

        self.phase += self.delta_phase;
        if self.phase > 2.0 * PI {
            self.phase -= 2.0 * PI;
        }
        self.frame_counter += 1;

        Ok(sample)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
