pub mod dispatcher;
pub mod kernel;
pub mod scheduler;
pub mod state;

pub use dispatcher::{alert_message, DispatchReport, Dispatcher, LogSummary, SinkFailure};
pub use kernel::{AcquisitionRuntime, RuntimeCommand, RuntimeEvent, EVENT_QUEUE_CAPACITY};
pub use scheduler::Pacer;
pub use state::RuntimeStatus;
