use async_trait::async_trait;
use log::debug;
use rosc::{encoder, OscMessage, OscPacket, OscType};
use std::net::SocketAddr;
use tokio::net::UdpSocket;

use super::Sink;
use crate::core::{DispatchBatch, ThresholdEvent, ThresholdState};
use crate::error::SinkError;

const SINK_NAME: &str = "telemetry";

/// Fire-and-forget OSC publisher over UDP.
///
/// Per present channel: `/adc/ch{i}/raw` (int) and `/adc/ch{i}/voltage`
/// (float). On threshold transitions: `/adc/alert/ch{i}/{high,low}` with
/// `[value, boundary]` or `/adc/alert/ch{i}/normal` with `value`.
pub struct OscTelemetrySink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl OscTelemetrySink {
    pub async fn connect(host: &str, port: u16) -> Result<Self, SinkError> {
        let io = |source| SinkError::Io { sink: SINK_NAME, source };

        let target = tokio::net::lookup_host((host, port))
            .await
            .map_err(io)?
            .next()
            .ok_or_else(|| SinkError::Send {
                sink: SINK_NAME,
                reason: format!("{}:{} did not resolve", host, port),
            })?;

        let bind_addr: SocketAddr = if target.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await.map_err(io)?;
        debug!("telemetry publishing to {}", target);

        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Messages for one batch, in send order
    pub fn messages(batch: &DispatchBatch) -> Vec<OscMessage> {
        let mut messages = Vec::with_capacity(batch.records.len() * 2);
        for record in &batch.records {
            messages.push(OscMessage {
                addr: format!("/adc/ch{}/raw", record.channel),
                args: vec![OscType::Int(clamp_i32(record.raw))],
            });
            messages.push(OscMessage {
                addr: format!("/adc/ch{}/voltage", record.channel),
                args: vec![OscType::Float(record.chosen_voltage as f32)],
            });
        }
        messages.extend(batch.events().filter_map(alert_message));
        messages
    }
}

fn alert_message(event: &ThresholdEvent) -> Option<OscMessage> {
    let value = OscType::Float(event.value as f32);
    let args = match (event.to, event.boundary) {
        (ThresholdState::High, Some(boundary)) | (ThresholdState::Low, Some(boundary)) => {
            vec![value, OscType::Float(boundary as f32)]
        }
        (ThresholdState::Normal, _) => vec![value],
        _ => return None,
    };
    Some(OscMessage {
        addr: format!("/adc/alert/ch{}/{}", event.channel, event.to.name()),
        args,
    })
}

fn clamp_i32(raw: i64) -> i32 {
    raw.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

#[async_trait]
impl Sink for OscTelemetrySink {
    fn name(&self) -> &'static str {
        SINK_NAME
    }

    async fn deliver(&mut self, batch: &DispatchBatch) -> Result<(), SinkError> {
        let mut first_error = None;

        for message in Self::messages(batch) {
            let result = match encoder::encode(&OscPacket::Message(message)) {
                Ok(bytes) => self
                    .socket
                    .send_to(&bytes, self.target)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            // Keep sending the rest of the batch; report the first failure
            if let Err(reason) = result {
                first_error.get_or_insert(SinkError::Send {
                    sink: SINK_NAME,
                    reason,
                });
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
