//! Definition-time errors

use thiserror::Error;

/// Errors raised while defining or building a pipeline
///
/// All of these are configuration errors: they surface before any SQL is sent
/// to the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("Duplicate step ID: {0}")]
    DuplicateId(String),

    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("Invalid edge arity for step '{step_id}': {reason}")]
    InvalidArity { step_id: String, reason: String },

    #[error("Step '{step_id}' references missing parameter '{name}'")]
    MissingParameter { step_id: String, name: String },

    #[error("Cycle detected in pipeline graph involving step '{0}'")]
    Cycle(String),

    #[error("Pipeline must have exactly one entry step, found: {}", .0.join(", "))]
    MultipleEntryPoints(Vec<String>),

    #[error("Pipeline has no steps")]
    Empty,

    #[error("Invalid configuration for step '{step_id}': {message}")]
    InvalidStep { step_id: String, message: String },
}

pub type DefinitionResult<T> = Result<T, DefinitionError>;
