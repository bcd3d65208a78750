//! One-way notification broadcast.
//!
//! Subscribers connect to the publish endpoint and receive every envelope
//! published after their connection was accepted. Slow subscribers skip
//! messages instead of blocking the publisher.

use std::time::Duration;

use crux_protocol::{Envelope, ProtocolResult};
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::address::Address;
use super::connection::{connect_with_retry, Connection, Listener, ACCEPT_ERROR_BACKOFF};
use super::error::{TransportError, TransportResult};
use super::frame::{read_frame, write_frame};

const BROADCAST_CAPACITY: usize = 256;

pub struct Publisher {
    address: Address,
    sender: broadcast::Sender<Vec<u8>>,
    accept_task: JoinHandle<()>,
}

impl Publisher {
    pub async fn bind(address: &Address) -> TransportResult<Self> {
        let listener = Listener::bind(address).await?;
        let address = listener
            .local_address(address)
            .map_err(|source| TransportError::Bind {
                address: address.clone(),
                source,
            })?;

        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        info!(address = %address, "Publish endpoint listening");
        let accept_task = tokio::spawn(accept_loop(listener, sender.clone()));

        Ok(Self {
            address,
            sender,
            accept_task,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Number of subscribers currently connected.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Broadcast `envelope` to every connected subscriber.
    ///
    /// Returns the number of subscribers it was queued for.
    pub fn publish(&self, envelope: &Envelope) -> ProtocolResult<usize> {
        let data = envelope.pack()?;
        // No subscribers is not an error
        Ok(self.sender.send(data).unwrap_or(0))
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(listener: Listener, sender: broadcast::Sender<Vec<u8>>) {
    let mut subscribers = JoinSet::new();

    loop {
        while subscribers.try_join_next().is_some() {}

        match listener.accept().await {
            Ok(conn) => {
                subscribers.spawn(feed_subscriber(conn, sender.subscribe()));
            }
            Err(e) => {
                warn!(error = %e, "Failed to accept subscriber");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
}

async fn feed_subscriber(mut conn: Connection, mut rx: broadcast::Receiver<Vec<u8>>) {
    loop {
        match rx.recv().await {
            Ok(data) => {
                if let Err(e) = write_frame(&mut conn, &data).await {
                    debug!(error = %e, "Subscriber went away");
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Subscriber lagging, notifications dropped");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Receiving end of a publish endpoint.
pub struct Subscriber {
    address: Address,
    connection: Connection,
}

impl Subscriber {
    pub async fn connect(address: &Address, timeout: Duration) -> TransportResult<Self> {
        let connection = connect_with_retry(address, timeout).await?;
        Ok(Self {
            address: address.clone(),
            connection,
        })
    }

    /// Wait for the next notification. Returns `Ok(None)` when the publisher
    /// has shut down.
    pub async fn next(&mut self) -> TransportResult<Option<Envelope>> {
        match read_frame(&mut self.connection).await {
            Ok(Some(data)) => Ok(Some(Envelope::unpack(&data)?)),
            Ok(None) => Ok(None),
            Err(source) => Err(TransportError::Io {
                address: self.address.clone(),
                source,
            }),
        }
    }
}
