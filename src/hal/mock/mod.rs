pub mod scripted;
pub mod simulated;

pub use scripted::{ScriptedTransport, ScriptProbe};
pub use simulated::SimulatedAdcTransport;
