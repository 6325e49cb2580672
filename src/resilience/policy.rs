use serde::{Deserialize, Serialize};

/// What a guarded sink does after a delivery failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkPolicy {
    /// Report and keep delivering on the next cycle
    Continue,

    /// Stop delivering after this many failures in a row
    DisableAfter { consecutive: u32 },
}

impl Default for SinkPolicy {
    fn default() -> Self {
        Self::Continue
    }
}
