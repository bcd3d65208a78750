//! Error types for the transport layer.

use std::time::Duration;

use crux_protocol::ProtocolError;
use thiserror::Error;

use super::address::Address;

/// Errors that can occur while talking over a request/reply channel.
#[derive(Error, Debug)]
pub enum TransportError {
    /// No reply arrived within the deadline. The channel has already been
    /// replaced; the caller decides whether to retry.
    #[error("Request to {address} timed out after {timeout:?}")]
    RequestTimeout { address: Address, timeout: Duration },

    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: Address,
        source: std::io::Error,
    },

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: Address,
        source: std::io::Error,
    },

    #[error("I/O error on {address}: {source}")]
    Io {
        address: Address,
        source: std::io::Error,
    },

    #[error("Peer at {0} closed the connection")]
    Disconnected(Address),

    /// A request was sent and its reply has not been received yet.
    #[error("A reply from {0} is still outstanding")]
    ReplyPending(Address),

    #[error("No request is outstanding on {0}")]
    NoRequestPending(Address),

    #[error("Endpoint {0} is closed")]
    Closed(Address),

    #[error("Invalid address '{0}'")]
    InvalidAddress(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Type alias for Result with TransportError.
pub type TransportResult<T> = Result<T, TransportError>;
