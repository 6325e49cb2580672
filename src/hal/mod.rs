pub mod device_config;
pub mod drivers;
pub mod lifecycle;
pub mod mock;
pub mod registry;
pub mod traits;
pub mod types;

pub use device_config::{push_device_settings, DeviceSettings};
pub use lifecycle::ManagedTransport;
pub use registry::TransportRegistry;
pub use traits::{Transport, TransportHandle};
pub use types::{ConnectionTracker, ConnectivityEvent, LinkState, TransportKind};
