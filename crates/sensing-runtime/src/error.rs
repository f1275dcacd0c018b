//! Runtime-wide error types.

use thiserror::Error;

/// Runtime-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Runtime-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Probe {probe} failed: {message}")]
    Probe { probe: String, message: String },

    #[error("Data manager error: {0}")]
    DataManager(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn probe(probe: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Probe {
            probe: probe.into(),
            message: message.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether this error signals a programming error rather than a
    /// recoverable runtime condition.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::InvalidStateTransition { .. } | Self::Precondition(_)
        )
    }
}
