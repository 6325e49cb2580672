use serde::{Deserialize, Serialize};

/// Acquisition runtime states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RuntimeStatus {
    #[default]
    Stopped,
    Connecting,
    Running,
    Error,
}

impl RuntimeStatus {
    /// Check if transition from current state to target state is valid
    pub fn can_transition_to(&self, target: &RuntimeStatus) -> bool {
        use RuntimeStatus::*;

        matches!(
            (self, target),
            // From Stopped
            (Stopped, Connecting) |

            // From Connecting
            (Connecting, Running) |
            (Connecting, Error) |
            (Connecting, Stopped) |

            // From Running
            (Running, Error) |
            (Running, Stopped) |

            // From Error
            (Error, Stopped) |
            (Error, Connecting)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Connecting => "Connecting",
            Self::Running => "Running",
            Self::Error => "Error",
        }
    }
}
