pub mod guarded_sink;
pub mod policy;

pub use guarded_sink::{DeliveryOutcome, GuardedSink};
pub use policy::SinkPolicy;
