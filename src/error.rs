use thiserror::Error;

use crate::core::payload::PayloadShapeError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors raised while reading the orchestrator configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("service '{0}' is already registered")]
    DuplicateService(String),

    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("edge {from} -> {to} would create a cycle")]
    Cycle { from: String, to: String },

    #[error("stage '{stage}' has more than one successor: {successors:?}")]
    AmbiguousFlow {
        stage: String,
        successors: Vec<String>,
    },

    #[error("'{0}' has no outgoing edges and is not the start of a pipeline")]
    DisconnectedPipeline(String),

    #[error("stage '{stage}' failed (status: {status:?}): {body}")]
    StageFailure {
        stage: String,
        status: Option<u16>,
        body: String,
    },

    #[error("stage '{stage}' is unreachable: {reason}")]
    UnreachableService { stage: String, reason: String },

    #[error("stage '{stage}' received a malformed payload: {source}")]
    PayloadShape {
        stage: String,
        #[source]
        source: PayloadShapeError,
    },

    #[error("pipeline cancelled before stage '{stage}' completed")]
    Cancelled { stage: String },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl OrchestratorError {
    /// Errors that can only happen while wiring the registry and flow graph.
    /// These should prevent the orchestrator from starting.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            OrchestratorError::DuplicateService(_)
                | OrchestratorError::UnknownService(_)
                | OrchestratorError::Cycle { .. }
                | OrchestratorError::AmbiguousFlow { .. }
                | OrchestratorError::DisconnectedPipeline(_)
                | OrchestratorError::Config(_)
        )
    }

    /// Errors produced while executing a single request.
    pub fn is_request_time(&self) -> bool {
        !self.is_configuration()
    }

    /// The stage an execution failed at, if the error belongs to one.
    pub fn stage(&self) -> Option<&str> {
        match self {
            OrchestratorError::StageFailure { stage, .. }
            | OrchestratorError::UnreachableService { stage, .. }
            | OrchestratorError::PayloadShape { stage, .. }
            | OrchestratorError::Cancelled { stage } => Some(stage),
            _ => None,
        }
    }
}
