use log::{debug, info, warn};

use super::{ConnectionTracker, ConnectivityEvent, LinkState, Transport, TransportHandle};
use crate::core::RawSample;
use crate::error::TransportError;

/// Manages the lifecycle of a transport and reports connectivity edges
pub struct ManagedTransport {
    inner: Box<dyn Transport>,
    handle: Option<Box<dyn TransportHandle>>,
    state: LinkState,
    tracker: ConnectionTracker,
}

impl ManagedTransport {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            inner: transport,
            handle: None,
            state: LinkState::Disconnected,
            tracker: ConnectionTracker::new(),
        }
    }

    pub fn endpoint(&self) -> String {
        self.inner.endpoint()
    }

    /// Connect the transport. The returned edge is `Some` on the first
    /// attempt and whenever connectivity flips.
    pub async fn connect(&mut self) -> (Result<(), TransportError>, Option<ConnectivityEvent>) {
        if self.state == LinkState::Connected {
            return (Ok(()), None);
        }

        info!("connecting to {} ({})", self.inner.endpoint(), self.inner.kind().name());
        match self.inner.connect().await {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = LinkState::Connected;
                (Ok(()), self.tracker.observe(true))
            }
            Err(e) => {
                warn!("connection to {} failed: {}", self.inner.endpoint(), e);
                self.state = LinkState::Disconnected;
                let err = match e {
                    TransportError::Connect(_) => e,
                    other => TransportError::Connect(other.to_string()),
                };
                (Err(err), self.tracker.observe(false))
            }
        }
    }

    /// Fetch one sample. A fatal error drops the handle and may report a
    /// disconnection edge.
    pub async fn fetch_one(
        &mut self,
    ) -> (Result<RawSample, TransportError>, Option<ConnectivityEvent>) {
        let Some(handle) = self.handle.as_mut() else {
            return (Err(TransportError::Closed), None);
        };

        let result = handle.fetch_one().await;
        match &result {
            Err(e) if !e.is_transient() => {
                warn!("transport {} lost: {}", self.inner.endpoint(), e);
                if let Some(mut handle) = self.handle.take() {
                    if let Err(close_err) = handle.close().await {
                        debug!("close after failure: {}", close_err);
                    }
                }
                self.state = LinkState::Disconnected;
                (result, self.tracker.observe(false))
            }
            _ => (result, None),
        }
    }

    /// Drain one outcome the handle already buffered. Buffered outcomes are
    /// never fatal, so no edge is reported here.
    pub fn try_next(&mut self) -> Option<Result<RawSample, TransportError>> {
        self.handle.as_mut()?.try_next()
    }

    /// Close the handle if open. Reports a disconnection edge if we were connected.
    pub async fn close(&mut self) -> (Result<(), TransportError>, Option<ConnectivityEvent>) {
        let result = match self.handle.take() {
            Some(mut handle) => handle.close().await,
            None => Ok(()),
        };
        let edge = if self.tracker.is_connected() {
            self.tracker.observe(false)
        } else {
            None
        };
        self.state = LinkState::Closed;
        (result, edge)
    }

    pub fn state(&self) -> LinkState {
        self.state
    }
}
