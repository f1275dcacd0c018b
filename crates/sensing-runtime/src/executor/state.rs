//! Executor lifecycle state machine.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Lifecycle state shared by every node of the executor tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutorState {
    /// Constructed, not yet initialized.
    #[default]
    Created,
    /// Configured and ready to start.
    Initialized,
    /// Running.
    Resumed,
    /// Temporarily halted; may be resumed.
    Paused,
    /// Terminal.
    Stopped,
}

impl ExecutorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Initialized => "INITIALIZED",
            Self::Resumed => "RESUMED",
            Self::Paused => "PAUSED",
            Self::Stopped => "STOPPED",
        }
    }

    /// Whether the executor has been started and not yet stopped.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Resumed | Self::Paused)
    }

    /// Validate a state transition.
    ///
    /// Stopped is terminal and a started executor can never return to
    /// `Initialized`; only pause/resume cycles are allowed while live.
    pub fn can_transition_to(&self, target: ExecutorState) -> bool {
        use ExecutorState::*;

        matches!(
            (self, target),
            (Created, Initialized)
                | (Initialized, Resumed)
                | (Resumed, Paused)
                | (Paused, Resumed)
                | (Initialized | Resumed | Paused, Stopped)
        )
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&self, target: ExecutorState) -> Result<ExecutorState, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::invalid_transition(self, target))
        }
    }
}

impl std::fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
