use log::{debug, warn};
use std::sync::Arc;

use super::SinkPolicy;
use crate::core::DispatchBatch;
use crate::error::SinkError;
use crate::observability::PipelineMetrics;
use crate::sinks::Sink;

/// Result of one guarded delivery
#[derive(Debug)]
pub enum DeliveryOutcome {
    Delivered,
    Failed {
        error: SinkError,
        /// First failure after a success (or since creation)
        first_in_streak: bool,
    },
    /// The policy disabled the sink; nothing was attempted
    Skipped,
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Wraps a sink so that its failures are counted and contained.
///
/// A failing sink never propagates its error to the caller as `Err`; the
/// outcome is returned as a value so the dispatcher can carry on with the
/// next sink.
pub struct GuardedSink {
    inner: Box<dyn Sink>,
    metrics: Arc<PipelineMetrics>,
    policy: SinkPolicy,
    streak: u32,
    disabled: bool,
}

impl GuardedSink {
    pub fn new(inner: Box<dyn Sink>, metrics: Arc<PipelineMetrics>, policy: SinkPolicy) -> Self {
        Self {
            inner,
            metrics,
            policy,
            streak: 0,
            disabled: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn failure_streak(&self) -> u32 {
        self.streak
    }

    pub async fn deliver(&mut self, batch: &DispatchBatch) -> DeliveryOutcome {
        if self.disabled {
            return DeliveryOutcome::Skipped;
        }

        match self.inner.deliver(batch).await {
            Ok(()) => {
                if self.streak > 0 {
                    debug!("{} sink recovered after {} failures", self.name(), self.streak);
                }
                self.streak = 0;
                DeliveryOutcome::Delivered
            }
            Err(error) => {
                self.metrics.record_sink_failure();
                self.streak = self.streak.saturating_add(1);
                let first_in_streak = self.streak == 1;

                if first_in_streak {
                    warn!("{}", error);
                } else {
                    debug!("{} (failure {} in a row)", error, self.streak);
                }

                if let SinkPolicy::DisableAfter { consecutive } = self.policy {
                    if self.streak >= consecutive.max(1) {
                        warn!("{} sink disabled after {} consecutive failures", self.name(), self.streak);
                        self.disabled = true;
                    }
                }

                DeliveryOutcome::Failed {
                    error,
                    first_in_streak,
                }
            }
        }
    }

    pub async fn close(&mut self) -> Result<(), SinkError> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Local;

    struct AlwaysFails;

    #[async_trait]
    impl Sink for AlwaysFails {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn deliver(&mut self, _batch: &DispatchBatch) -> Result<(), SinkError> {
            Err(SinkError::Send {
                sink: "broken",
                reason: "unreachable".to_string(),
            })
        }
    }

    fn batch() -> DispatchBatch {
        DispatchBatch {
            sequence: 0,
            received_at: Local::now(),
            device_timestamp: None,
            records: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_failures_are_counted_and_streaked() {
        let metrics = Arc::new(PipelineMetrics::new());
        let mut sink = GuardedSink::new(Box::new(AlwaysFails), metrics.clone(), SinkPolicy::Continue);

        let first = sink.deliver(&batch()).await;
        let second = sink.deliver(&batch()).await;

        assert!(matches!(first, DeliveryOutcome::Failed { first_in_streak: true, .. }));
        assert!(matches!(second, DeliveryOutcome::Failed { first_in_streak: false, .. }));
        assert_eq!(metrics.sink_failures(), 2);
        assert!(!sink.is_disabled());
    }

    #[tokio::test]
    async fn test_disable_after_consecutive_failures() {
        let metrics = Arc::new(PipelineMetrics::new());
        let mut sink = GuardedSink::new(
            Box::new(AlwaysFails),
            metrics.clone(),
            SinkPolicy::DisableAfter { consecutive: 2 },
        );

        sink.deliver(&batch()).await;
        sink.deliver(&batch()).await;
        assert!(sink.is_disabled());
        assert!(matches!(sink.deliver(&batch()).await, DeliveryOutcome::Skipped));
        assert_eq!(metrics.sink_failures(), 2);
    }

    /// Fails a fixed number of times, then accepts everything
    struct FailsFirst(u32);

    #[async_trait]
    impl Sink for FailsFirst {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn deliver(&mut self, _batch: &DispatchBatch) -> Result<(), SinkError> {
            if self.0 == 0 {
                return Ok(());
            }
            self.0 -= 1;
            Err(SinkError::Closed("flaky"))
        }
    }

    #[tokio::test]
    async fn test_success_ends_the_streak() {
        let metrics = Arc::new(PipelineMetrics::new());
        let mut sink = GuardedSink::new(Box::new(FailsFirst(3)), metrics.clone(), SinkPolicy::Continue);

        for _ in 0..3 {
            sink.deliver(&batch()).await;
        }
        assert_eq!(sink.failure_streak(), 3);

        assert!(sink.deliver(&batch()).await.is_delivered());
        assert_eq!(sink.failure_streak(), 0);
        assert_eq!(metrics.sink_failures(), 3);
    }
}
