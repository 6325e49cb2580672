use serde::{Deserialize, Serialize};

/// Transport classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// One request per cycle
    Http,
    /// Newline-delimited records over a byte stream
    Serial,
    /// In-process transports used by tests and the simulator
    Mock,
}

impl TransportKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Serial => "serial",
            Self::Mock => "mock",
        }
    }
}

/// Link state tracked by `ManagedTransport`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    Disconnected,
    Connected,
    Closed,
}

/// Emitted once per connectivity edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityEvent {
    pub connected: bool,
}

/// Turns per-attempt connectivity observations into edge events
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    last: Option<bool>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the outcome of an attempt; returns an event only if it differs
    /// from the previous report. The first report always produces an event.
    pub fn observe(&mut self, connected: bool) -> Option<ConnectivityEvent> {
        if self.last == Some(connected) {
            return None;
        }
        self.last = Some(connected);
        Some(ConnectivityEvent { connected })
    }

    pub fn is_connected(&self) -> bool {
        self.last == Some(true)
    }
}
