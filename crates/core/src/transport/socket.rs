//! Client side of a strict request/reply channel.

use std::time::Duration;

use crux_protocol::{AgentSettings, Envelope};
use tracing::{debug, warn};

use super::address::Address;
use super::connection::{connect, connect_with_retry, Connection};
use super::error::{TransportError, TransportResult};
use super::frame::{read_frame, write_frame};

/// Deadlines applied to a client channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    /// How long to wait for each reply. `None` waits forever.
    pub request_timeout: Option<Duration>,

    /// How long to keep retrying a peer that is not listening yet.
    pub connect_timeout: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            request_timeout: None,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl ChannelOptions {
    pub fn from_settings(settings: &AgentSettings) -> Self {
        Self {
            request_timeout: match settings.request_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// A request/reply client channel that survives timeouts.
///
/// Requests and replies strictly alternate: a second `send` before the
/// previous reply is received fails with `ReplyPending`. When a reply does
/// not arrive in time the underlying connection is discarded and replaced,
/// so the socket is immediately usable for a new request. A late reply to
/// the abandoned request is never delivered.
///
/// The connection is opened lazily on first use. If a `send` or `recv`
/// future is dropped before it completes, the connection may hold half a
/// frame or an unread reply, so the next operation replaces it.
pub struct ManagedSocket {
    address: Address,
    connection: Option<Connection>,
    awaiting_reply: bool,

    /// Set while a frame is being written or read.
    in_flight: bool,
    connect_timeout: Duration,
}

impl ManagedSocket {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            connection: None,
            awaiting_reply: false,
            in_flight: false,
            connect_timeout: ChannelOptions::default().connect_timeout,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    /// Connect now instead of on the first `send`.
    pub async fn connect(&mut self) -> TransportResult<()> {
        if self.connection.is_none() {
            self.connection = Some(connect_with_retry(&self.address, self.connect_timeout).await?);
        }
        Ok(())
    }

    /// Drop the current connection and forget any outstanding request.
    pub fn disconnect(&mut self) {
        self.connection = None;
        self.awaiting_reply = false;
        self.in_flight = false;
    }

    /// Send one request.
    ///
    /// # Errors
    ///
    /// Returns `ReplyPending` if the previous request's reply has not been
    /// received yet.
    pub async fn send(&mut self, envelope: &Envelope) -> TransportResult<()> {
        if self.in_flight {
            warn!(address = %self.address, "Previous request was abandoned, reconnecting");
            self.disconnect();
        }
        if self.awaiting_reply {
            return Err(TransportError::ReplyPending(self.address.clone()));
        }

        let data = envelope.pack()?;
        self.connect().await?;
        let Some(conn) = self.connection.as_mut() else {
            return Err(TransportError::Closed(self.address.clone()));
        };

        self.in_flight = true;
        let written = write_frame(conn, &data).await;
        self.in_flight = false;
        if let Err(source) = written {
            self.disconnect();
            return Err(TransportError::Io {
                address: self.address.clone(),
                source,
            });
        }

        self.awaiting_reply = true;
        Ok(())
    }

    /// Receive the reply to the outstanding request.
    ///
    /// # Errors
    ///
    /// Returns `RequestTimeout` if `timeout` elapses first. The connection
    /// has been replaced by the time the error is returned.
    pub async fn recv(&mut self, timeout: Option<Duration>) -> TransportResult<Envelope> {
        if self.in_flight {
            warn!(address = %self.address, "Previous receive was abandoned, dropping connection");
            self.disconnect();
            return Err(TransportError::Disconnected(self.address.clone()));
        }
        if !self.awaiting_reply {
            return Err(TransportError::NoRequestPending(self.address.clone()));
        }
        let Some(conn) = self.connection.as_mut() else {
            self.awaiting_reply = false;
            return Err(TransportError::Disconnected(self.address.clone()));
        };

        self.in_flight = true;
        let read = match timeout {
            Some(limit) => tokio::time::timeout(limit, read_frame(conn)).await.ok(),
            None => Some(read_frame(conn).await),
        };
        self.in_flight = false;

        let Some(read) = read else {
            let limit = timeout.unwrap_or_default();
            warn!(address = %self.address, timeout = ?limit, "Request timed out, resetting connection");
            self.reset().await;
            return Err(TransportError::RequestTimeout {
                address: self.address.clone(),
                timeout: limit,
            });
        };

        match read {
            Ok(Some(data)) => {
                self.awaiting_reply = false;
                Ok(Envelope::unpack(&data)?)
            }
            Ok(None) => {
                self.disconnect();
                Err(TransportError::Disconnected(self.address.clone()))
            }
            Err(source) => {
                self.disconnect();
                Err(TransportError::Io {
                    address: self.address.clone(),
                    source,
                })
            }
        }
    }

    /// Send a request and wait for its reply.
    pub async fn call(&mut self, envelope: &Envelope, timeout: Option<Duration>) -> TransportResult<Envelope> {
        self.send(envelope).await?;
        self.recv(timeout).await
    }

    /// Replace the connection after a timeout.
    ///
    /// A single immediate reconnect is attempted. If the peer is unreachable
    /// the socket stays disconnected and reconnects on the next `send`.
    async fn reset(&mut self) {
        self.disconnect();
        match connect(&self.address).await {
            Ok(conn) => self.connection = Some(conn),
            Err(e) => debug!(address = %self.address, error = %e, "Reconnect deferred"),
        }
    }
}
