use thiserror::Error;

/// A device record that could not be turned into a `RawSample`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MalformedFrameError {
    #[error("record does not open a JSON object")]
    NotAFrame,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("frame has no `channels` object")]
    MissingChannels,

    #[error("channel {channel}: {reason}")]
    BadChannel { channel: String, reason: String },
}

/// Failures raised by a transport.
///
/// `Connect` ends the current run attempt. Everything else is transient and
/// only costs the pipeline one cycle.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("malformed frame: {0}")]
    Malformed(#[from] MalformedFrameError),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The read window closed without a complete frame.
    #[error("no complete frame available")]
    Idle,

    #[error("transport is closed")]
    Closed,
}

impl TransportError {
    /// Whether the acquisition loop may keep going after this error.
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Connect(_) | TransportError::Closed)
    }

    /// Whether this error is added to the error counter.
    pub fn is_counted(&self) -> bool {
        matches!(self, TransportError::Read(_) | TransportError::Timeout(_))
    }
}

/// A sink could not accept a batch.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{sink}: i/o error: {source}")]
    Io {
        sink: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{sink}: send failed: {reason}")]
    Send { sink: &'static str, reason: String },

    #[error("{0}: sink is closed")]
    Closed(&'static str),
}

/// Problems found while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no transport selected")]
    NoTransport,

    #[error("sample rate {0} Hz is outside 0.1..=1000")]
    InvalidRate(f64),

    #[error("channel {channel}: filter window {window} is outside 2..=50")]
    InvalidWindow { channel: usize, window: usize },

    #[error("config i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse: {0}")]
    Parse(#[from] serde_json::Error),
}
