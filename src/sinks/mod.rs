pub mod csv_log;
pub mod display;
pub mod telemetry;

use async_trait::async_trait;

use crate::core::DispatchBatch;
use crate::error::SinkError;

pub use csv_log::CsvLogSink;
pub use display::{display_channel, DisplayReceiver, DisplaySink};
pub use telemetry::OscTelemetrySink;

/// Destination for dispatched batches
#[async_trait]
pub trait Sink: Send {
    /// Short name used in logs and failure reports
    fn name(&self) -> &'static str;

    async fn deliver(&mut self, batch: &DispatchBatch) -> Result<(), SinkError>;

    /// Flush and release resources. Called once when the pipeline stops.
    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
