use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::core::RawSample;
use crate::error::TransportError;
use crate::hal::{Transport, TransportHandle, TransportKind};

type Script = Arc<Mutex<VecDeque<Result<RawSample, TransportError>>>>;

/// Counters shared between a `ScriptedTransport`, its handles and the test
#[derive(Debug, Default)]
pub struct ScriptProbe {
    connects: AtomicU64,
    fetches: AtomicU64,
    closes: AtomicU64,
}

impl ScriptProbe {
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Transport that replays a fixed list of outcomes.
///
/// Once the script runs out it keeps returning the fallback sample, or
/// `TransportError::Idle` when there is none.
pub struct ScriptedTransport {
    script: Script,
    fallback: Option<RawSample>,
    fail_connect: bool,
    probe: Arc<ScriptProbe>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Result<RawSample, TransportError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(steps.into())),
            fallback: None,
            fail_connect: false,
            probe: Arc::new(ScriptProbe::default()),
        }
    }

    /// Endless supply of the same sample
    pub fn repeating(sample: RawSample) -> Self {
        Self::new(Vec::new()).with_fallback(sample)
    }

    /// Transport whose `connect` always fails
    pub fn unreachable() -> Self {
        Self {
            fail_connect: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn with_fallback(mut self, sample: RawSample) -> Self {
        self.fallback = Some(sample);
        self
    }

    pub fn probe(&self) -> Arc<ScriptProbe> {
        self.probe.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Mock
    }

    fn endpoint(&self) -> String {
        "mock://scripted".to_string()
    }

    async fn connect(&self) -> Result<Box<dyn TransportHandle>, TransportError> {
        self.probe.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(TransportError::Connect("scripted refusal".to_string()));
        }
        Ok(Box::new(ScriptedHandle {
            script: self.script.clone(),
            fallback: self.fallback.clone(),
            probe: self.probe.clone(),
            open: true,
        }))
    }
}

struct ScriptedHandle {
    script: Script,
    fallback: Option<RawSample>,
    probe: Arc<ScriptProbe>,
    open: bool,
}

#[async_trait]
impl TransportHandle for ScriptedHandle {
    async fn fetch_one(&mut self) -> Result<RawSample, TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        self.probe.fetches.fetch_add(1, Ordering::SeqCst);

        let next = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();

        match next {
            Some(step) => step,
            None => self.fallback.clone().ok_or(TransportError::Idle),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.open {
            self.open = false;
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
