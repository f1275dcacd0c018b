//! Controller lifecycle state machine.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Lifecycle state of a [`StudyDeploymentController`](super::StudyDeploymentController).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudyDeploymentControllerState {
    #[default]
    Unknown,
    Created,
    Initialized,
    Resumed,
    Paused,
    Stopped,
}

impl StudyDeploymentControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Resumed => "resumed",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }

    pub fn can_transition_to(&self, target: StudyDeploymentControllerState) -> bool {
        use StudyDeploymentControllerState::*;

        matches!(
            (self, target),
            (Unknown, Created)
                | (Created, Initialized)
                | (Initialized, Resumed)
                | (Resumed, Paused)
                | (Paused, Resumed)
                | (Initialized | Resumed | Paused, Stopped)
        )
    }

    pub fn transition_to(
        &self,
        target: StudyDeploymentControllerState,
    ) -> Result<StudyDeploymentControllerState, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::invalid_transition(self, target))
        }
    }
}

impl std::fmt::Display for StudyDeploymentControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
