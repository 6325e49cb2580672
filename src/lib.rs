pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod hal;
pub mod nodes;
pub mod observability;
pub mod resilience;
pub mod sinks;

pub use config::{AcquisitionConfig, LiveSettings, SettingsHandle};
pub use engine::{AcquisitionRuntime, RuntimeCommand, RuntimeEvent, RuntimeStatus};
pub use error::{ConfigError, MalformedFrameError, SinkError, TransportError};
