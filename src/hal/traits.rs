use async_trait::async_trait;

use super::types::TransportKind;
use crate::core::RawSample;
use crate::error::TransportError;

/// Trait implemented by transports; connecting yields a handle that produces samples
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Human-readable endpoint (URL, port name) for logs and events
    fn endpoint(&self) -> String;

    /// Open the connection. Any failure here is fatal for the run attempt.
    async fn connect(&self) -> Result<Box<dyn TransportHandle>, TransportError>;
}

/// An open connection to the device
#[async_trait]
pub trait TransportHandle: Send {
    /// Produce the next sample. Waits at most the transport's per-call timeout.
    async fn fetch_one(&mut self) -> Result<RawSample, TransportError>;

    /// Next outcome already buffered by an earlier fetch, without waiting.
    /// Request/response transports never buffer and keep the default.
    fn try_next(&mut self) -> Option<Result<RawSample, TransportError>> {
        None
    }

    /// Release the underlying connection. Safe to call more than once.
    async fn close(&mut self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;
}
