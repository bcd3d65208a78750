//! Error types for the wire protocol and pipeline editing.

use thiserror::Error;

/// Errors raised while encoding or decoding envelopes and I/O objects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The envelope is missing a required field or could not be decoded.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// A payload key has no matching entry in the I/O schema.
    #[error("Key '{0}' is not declared in the schema")]
    UnknownField(String),

    /// A payload value does not have the shape its schema type requires.
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidField { field: String, reason: String },
}

/// Type alias for Result with ProtocolError.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised by the pipeline definition editing operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Invalid order array: {0:?}")]
    InvalidOrder(Vec<usize>),

    #[error("Component \"{0}\" is not loaded")]
    ComponentNotLoaded(String),

    #[error("Component \"{0}\" is already loaded")]
    ComponentAlreadyLoaded(String),

    #[error("Component \"{component}\" is in use by step {step}")]
    ComponentInUse { component: String, step: usize },

    #[error("Step index {index} is out of range (pipeline has {len} steps)")]
    StepOutOfRange { index: usize, len: usize },
}
