//! Error types for the observation engine.

use thiserror::Error;

use crate::ids::{ElementId, StrategyId};

/// Result type alias for nexus operations.
pub type Result<T> = std::result::Result<T, NexusError>;

/// Structural problems with an [`AnimationStrategy`](crate::AnimationStrategy).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("strategy selector must be a non-empty string")]
    EmptySelector,
    #[error("strategy mainClass must be a non-empty string")]
    EmptyMainClass,
    #[error("strategy thresholds must contain at least one value")]
    EmptyThresholds,
    #[error("threshold {value} is outside [0, 1]")]
    ThresholdOutOfRange { value: f32 },
}

/// Failure reported by a host capability (watcher construction, mostly).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("host error: {0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors raised by [`RuntimeNexus`](crate::RuntimeNexus) operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NexusError {
    #[error("invalid strategy: {0}")]
    Validation(#[from] ValidationError),

    #[error("unknown strategy: {0}")]
    UnknownStrategy(StrategyId),

    #[error("unknown element: {0}")]
    UnknownElement(ElementId),

    #[error("nexus has been destroyed")]
    Terminal,

    #[error(transparent)]
    Host(#[from] HostError),
}

impl NexusError {
    /// Unknown-id errors are safe to ignore for idempotent callers.
    pub fn is_unknown(&self) -> bool {
        matches!(
            self,
            NexusError::UnknownStrategy(_) | NexusError::UnknownElement(_)
        )
    }
}

/// Errors produced while a strategy source loads or parses strategies.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("strategy json parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to load animation strategies: {0}")]
    Load(String),
}

/// Errors from the startup sequence: load, then construct.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Nexus(#[from] NexusError),
}
