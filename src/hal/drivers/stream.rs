use async_trait::async_trait;
use log::{debug, trace};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::core::RawSample;
use crate::error::{MalformedFrameError, TransportError};
use crate::hal::{Transport, TransportHandle, TransportKind};

/// Drop buffered bytes if a line grows past this without a newline
const MAX_LINE_BYTES: usize = 64 * 1024;
const READ_CHUNK_BYTES: usize = 1024;
/// Upper bound on back-to-back reads in one fetch when the device floods
const MAX_DRAIN_READS: usize = 64;

/// Splits a byte stream into trimmed, newline-delimited records.
/// Bytes after the last newline are kept for the next push.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() > MAX_LINE_BYTES && !self.buffer.contains(&b'\n') {
            debug!("discarding {} bytes without a line break", self.buffer.len());
            self.buffer.clear();
        }
    }

    /// Next complete non-empty record, decoded lossily as UTF-8
    pub fn next_record(&mut self) -> Option<String> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
        None
    }

    /// Bytes waiting for a line break
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Decode a record into a sample. Only records that open a JSON object
    /// are attempted.
    pub fn decode(record: &str) -> Result<RawSample, MalformedFrameError> {
        if !record.starts_with('{') {
            return Err(MalformedFrameError::NotAFrame);
        }
        RawSample::from_json_str(record)
    }
}

/// Opens the byte stream a `StreamTransport` reads from
#[async_trait]
pub trait StreamOpener: Send + Sync {
    type Stream: AsyncRead + Unpin + Send + 'static;

    fn endpoint(&self) -> String;

    async fn open(&self) -> std::io::Result<Self::Stream>;
}

/// Newline-delimited JSON over any byte stream
pub struct StreamTransport<O> {
    opener: O,
    kind: TransportKind,
    settle: Duration,
    read_timeout: Duration,
}

impl<O: StreamOpener> StreamTransport<O> {
    /// `settle` is waited after opening, before the first read
    pub fn new(opener: O, kind: TransportKind, settle: Duration, read_timeout: Duration) -> Self {
        Self {
            opener,
            kind,
            settle,
            read_timeout,
        }
    }
}

#[async_trait]
impl<O: StreamOpener + 'static> Transport for StreamTransport<O> {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn endpoint(&self) -> String {
        self.opener.endpoint()
    }

    async fn connect(&self) -> Result<Box<dyn TransportHandle>, TransportError> {
        let stream = self
            .opener
            .open()
            .await
            .map_err(|e| TransportError::Connect(format!("{}: {}", self.opener.endpoint(), e)))?;

        if !self.settle.is_zero() {
            debug!("waiting {:?} for device reset", self.settle);
            tokio::time::sleep(self.settle).await;
        }

        Ok(Box::new(StreamHandle::new(stream, self.read_timeout)))
    }
}

/// Open stream plus framing state.
///
/// Every read drains whatever the device has already sent, so a device
/// that writes faster than the pacing rate never builds a backlog: all
/// complete records are decoded at once and handed out through
/// `fetch_one` followed by `try_next`. Records that open a frame but fail
/// to decode are queued as `Malformed` in arrival order; lines that do not
/// open a frame at all (boot banners, debug prints) are skipped.
pub struct StreamHandle<S> {
    stream: Option<S>,
    framer: LineFramer,
    ready: VecDeque<Result<RawSample, MalformedFrameError>>,
    read_timeout: Duration,
}

impl<S: AsyncRead + Unpin + Send> StreamHandle<S> {
    pub fn new(stream: S, read_timeout: Duration) -> Self {
        Self {
            stream: Some(stream),
            framer: LineFramer::new(),
            ready: VecDeque::new(),
            read_timeout,
        }
    }

    /// Decoded outcomes waiting to be handed out
    pub fn buffered(&self) -> usize {
        self.ready.len()
    }

    fn drain_framer(&mut self) {
        while let Some(record) = self.framer.next_record() {
            match LineFramer::decode(&record) {
                Err(MalformedFrameError::NotAFrame) => trace!("skipping line: {}", record),
                Err(e) => {
                    debug!("discarding record ({}): {}", e, record);
                    self.ready.push_back(Err(e));
                }
                Ok(sample) => self.ready.push_back(Ok(sample)),
            }
        }
    }

    /// Pull in bytes that are already available without waiting. Stops at
    /// the first read that would block, or at end of stream.
    async fn read_available(&mut self, chunk: &mut [u8]) {
        for _ in 0..MAX_DRAIN_READS {
            let Some(stream) = self.stream.as_mut() else {
                return;
            };
            match tokio::time::timeout(Duration::ZERO, stream.read(chunk)).await {
                Ok(Ok(0)) => {
                    // Buffered records still go out; the next fetch reports Closed
                    self.stream = None;
                    return;
                }
                Ok(Ok(n)) => self.framer.push(&chunk[..n]),
                Ok(Err(e)) => {
                    debug!("read after drain: {}", e);
                    return;
                }
                Err(_) => return,
            }
        }
    }
}

#[async_trait]
impl<S: AsyncRead + Unpin + Send> TransportHandle for StreamHandle<S> {
    async fn fetch_one(&mut self) -> Result<RawSample, TransportError> {
        if let Some(outcome) = self.ready.pop_front() {
            return outcome.map_err(TransportError::from);
        }

        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        let mut chunk = [0u8; READ_CHUNK_BYTES];

        let read = tokio::time::timeout(self.read_timeout, stream.read(&mut chunk)).await;
        match read {
            Err(_) => return Err(TransportError::Idle),
            Ok(Err(e)) => return Err(TransportError::Read(e.to_string())),
            Ok(Ok(0)) => {
                self.stream = None;
                return Err(TransportError::Closed);
            }
            Ok(Ok(n)) => self.framer.push(&chunk[..n]),
        }
        self.read_available(&mut chunk).await;

        self.drain_framer();
        match self.ready.pop_front() {
            Some(outcome) => outcome.map_err(TransportError::from),
            None => Err(TransportError::Idle),
        }
    }

    fn try_next(&mut self) -> Option<Result<RawSample, TransportError>> {
        self.ready
            .pop_front()
            .map(|outcome| outcome.map_err(TransportError::from))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stream = None;
        self.ready.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}
