//! Client stub for the daemon's command endpoint.

use crux_protocol::{names, Envelope, Payload};
use thiserror::Error;

use crate::transport::{Address, ChannelOptions, ManagedSocket, TransportError};

/// Errors returned by [`DaemonApi`].
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The daemon answered with a failure reply.
    #[error("Daemon replied '{name}': {message}")]
    Failure { name: String, message: String },

    #[error("Unexpected reply from daemon: {0}")]
    UnexpectedReply(String),
}

/// Typed calls against a running daemon.
pub struct DaemonApi {
    socket: ManagedSocket,
    options: ChannelOptions,
}

impl DaemonApi {
    pub fn new(address: Address, options: ChannelOptions) -> Self {
        Self {
            socket: ManagedSocket::new(address).with_connect_timeout(options.connect_timeout),
            options,
        }
    }

    pub fn address(&self) -> &Address {
        self.socket.address()
    }

    /// Send a raw command and return the reply, failure replies included.
    pub async fn call(&mut self, envelope: &Envelope) -> Result<Envelope, ApiError> {
        Ok(self.socket.call(envelope, self.options.request_timeout).await?)
    }

    /// Launch the component at `path` under the daemon's pool.
    ///
    /// Returns the address the component can be reached at.
    pub async fn process_start(&mut self, path: &str) -> Result<Address, ApiError> {
        let reply = self
            .checked_call(&Envelope::new(names::PROCESS_START).with_payload(path))
            .await?;
        let text = reply
            .message()
            .ok_or_else(|| ApiError::UnexpectedReply(reply.to_string()))?;
        text.parse()
            .map_err(|e: TransportError| ApiError::UnexpectedReply(e.to_string()))
    }

    /// Addresses of every component the daemon is running.
    pub async fn process_list(&mut self) -> Result<Vec<Address>, ApiError> {
        let reply = self.checked_call(&Envelope::new(names::PROCESS_LIST)).await?;
        let entries = reply
            .payload
            .as_ref()
            .and_then(Payload::as_sequence)
            .ok_or_else(|| ApiError::UnexpectedReply(reply.to_string()))?;

        entries
            .iter()
            .map(|entry| {
                entry
                    .as_str()
                    .ok_or_else(|| ApiError::UnexpectedReply(reply.to_string()))?
                    .parse()
                    .map_err(|e: TransportError| ApiError::UnexpectedReply(e.to_string()))
            })
            .collect()
    }

    /// Terminate every component the daemon is running.
    pub async fn process_killall(&mut self) -> Result<(), ApiError> {
        self.checked_call(&Envelope::new(names::PROCESS_KILLALL))
            .await
            .map(|_| ())
    }

    /// Stop the daemon.
    pub async fn shutdown(&mut self) -> Result<(), ApiError> {
        self.checked_call(&Envelope::new(names::DAEMON_SHUTDOWN))
            .await
            .map(|_| ())
    }

    async fn checked_call(&mut self, envelope: &Envelope) -> Result<Envelope, ApiError> {
        let reply = self.call(envelope).await?;
        if reply.success {
            Ok(reply)
        } else {
            Err(ApiError::Failure {
                message: reply.message().unwrap_or("no message").to_string(),
                name: reply.name,
            })
        }
    }
}
