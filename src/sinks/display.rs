use async_trait::async_trait;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use super::Sink;
use crate::core::DispatchBatch;
use crate::error::SinkError;

const SINK_NAME: &str = "display";

/// Create the bounded display handoff. When the consumer falls behind, the
/// oldest undelivered batch is dropped so the producer never blocks.
pub fn display_channel(capacity: usize) -> (DisplaySink, DisplayReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let consumer = Arc::new(());
    (
        DisplaySink {
            tx,
            evict: rx.clone(),
            dropped: dropped.clone(),
            consumer: Arc::downgrade(&consumer),
        },
        DisplayReceiver {
            rx,
            dropped,
            _consumer: consumer,
        },
    )
}

/// Producer half, owned by the acquisition task
pub struct DisplaySink {
    tx: Sender<DispatchBatch>,
    evict: Receiver<DispatchBatch>,
    dropped: Arc<AtomicU64>,
    // Gone once every DisplayReceiver clone is dropped
    consumer: Weak<()>,
}

#[async_trait]
impl Sink for DisplaySink {
    fn name(&self) -> &'static str {
        SINK_NAME
    }

    async fn deliver(&mut self, batch: &DispatchBatch) -> Result<(), SinkError> {
        if self.consumer.strong_count() == 0 {
            return Err(SinkError::Closed(SINK_NAME));
        }

        let mut pending = batch.clone();
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(returned)) => {
                    if self.evict.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    pending = returned;
                }
                Err(TrySendError::Disconnected(_)) => return Err(SinkError::Closed(SINK_NAME)),
            }
        }
    }
}

/// Consumer half, handed to the presentation layer
#[derive(Clone)]
pub struct DisplayReceiver {
    rx: Receiver<DispatchBatch>,
    dropped: Arc<AtomicU64>,
    _consumer: Arc<()>,
}

impl DisplayReceiver {
    /// Everything currently queued, oldest first
    pub fn drain(&self) -> Vec<DispatchBatch> {
        self.rx.try_iter().collect()
    }

    /// Wait up to `timeout` for the next batch. `None` on timeout or once
    /// the producer is gone and the queue is empty.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<DispatchBatch> {
        match self.rx.recv_timeout(timeout) {
            Ok(batch) => Some(batch),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Batches evicted because the consumer fell behind
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
