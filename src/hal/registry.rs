use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::time::Duration;

use super::drivers::{HttpTransport, SerialOpener, StreamTransport};
use super::{Transport, TransportKind};
use crate::config::TransportConfig;

type TransportFactory = Box<dyn Fn(&TransportConfig) -> Result<Box<dyn Transport>> + Send + Sync>;

/// Registry of transport constructors, keyed by transport kind
pub struct TransportRegistry {
    factories: HashMap<TransportKind, TransportFactory>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the HTTP and serial transports
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(TransportKind::Http, |config| match config {
            TransportConfig::Http { host, timeout_ms } => Ok(Box::new(HttpTransport::new(
                host,
                Duration::from_millis(*timeout_ms),
            )?) as Box<dyn Transport>),
            other => Err(anyhow!("http factory cannot build {:?}", other)),
        });
        registry.register(TransportKind::Serial, |config| match config {
            TransportConfig::Serial {
                port,
                baud_rate,
                settle_ms,
                read_timeout_ms,
            } => Ok(Box::new(StreamTransport::new(
                SerialOpener::new(port.clone(), *baud_rate),
                TransportKind::Serial,
                Duration::from_millis(*settle_ms),
                Duration::from_millis(*read_timeout_ms),
            )) as Box<dyn Transport>),
            other => Err(anyhow!("serial factory cannot build {:?}", other)),
        });
        registry
    }

    pub fn register<F>(&mut self, kind: TransportKind, factory: F)
    where
        F: Fn(&TransportConfig) -> Result<Box<dyn Transport>> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Box::new(factory));
    }

    pub fn create(&self, config: &TransportConfig) -> Result<Box<dyn Transport>> {
        let kind = Self::kind_of(config);
        let factory = self
            .factories
            .get(&kind)
            .ok_or_else(|| anyhow!("No transport registered for {}", kind.name()))?;
        factory(config)
    }

    pub fn kind_of(config: &TransportConfig) -> TransportKind {
        match config {
            TransportConfig::Http { .. } => TransportKind::Http,
            TransportConfig::Serial { .. } => TransportKind::Serial,
        }
    }

    pub fn list_kinds(&self) -> Vec<TransportKind> {
        self.factories.keys().copied().collect()
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
