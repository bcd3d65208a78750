//! Error types for pipeline execution.

use crux_protocol::PipelineError;
use thiserror::Error;

use crate::component::HandleError;

/// Errors that end a pipeline run.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(#[from] PipelineError),

    #[error("Failed to launch component '{component}': {reason}")]
    Launch { component: String, reason: String },

    #[error("Component '{component}' is unreachable: {source}")]
    Handle {
        component: String,
        source: HandleError,
    },

    #[error("Component '{component}' has unparsable version '{value}': {reason}")]
    InvalidVersion {
        component: String,
        value: String,
        reason: String,
    },

    /// A component's version does not satisfy the pipeline's constraint.
    #[error("Component '{component}' is version {version}, pipeline requires {requirement}")]
    UnmetDependency {
        component: String,
        version: String,
        requirement: String,
    },

    /// A step's component replied with a failure.
    #[error("Step {index} ({component}) failed: {message}")]
    BrokenPipeline {
        index: usize,
        component: String,
        message: String,
    },
}
