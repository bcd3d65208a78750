//! Error types for both ends of the component protocol.

use crux_protocol::ProtocolError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::transport::{Address, TransportError};

/// Errors raised inside a component process.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// The worker could not start, e.g. no bind address was provided.
    #[error("Worker could not be instantiated: {0}")]
    Instantiation(String),

    /// The embedding program broke the request/reply protocol.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Errors raised by an orchestrator-side component handle.
#[derive(Error, Debug)]
pub enum HandleError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Could not get descriptor from {address}: {reason}")]
    Descriptor { address: Address, reason: String },
}
