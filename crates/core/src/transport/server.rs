//! Server side of a strict request/reply channel.
//!
//! Any number of clients may connect. Each connection gets its own task
//! that reads one request, hands it to the owner through a queue, and waits
//! for the owner to answer before reading the next one. The owner therefore
//! processes requests one at a time in arrival order.

use crux_protocol::{Envelope, ProtocolError, ProtocolResult};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::address::Address;
use super::connection::{Connection, Listener, ACCEPT_ERROR_BACKOFF};
use super::error::{TransportError, TransportResult};
use super::frame::{read_frame, write_frame};

const REQUEST_QUEUE_DEPTH: usize = 64;

/// One incoming request together with the means to answer it.
pub struct Request {
    /// The decoded request, or the reason it could not be decoded.
    pub envelope: Result<Envelope, ProtocolError>,
    pub responder: Responder,
}

/// A packed reply on its way to the connection task.
struct Reply {
    data: Vec<u8>,

    /// Fired once the frame has been written.
    written: Option<oneshot::Sender<()>>,
}

/// Answers exactly one request.
///
/// If the requester has gone away the reply is dropped silently.
pub struct Responder {
    reply: oneshot::Sender<Reply>,
}

impl Responder {
    /// Pack and send `envelope` as the reply.
    pub fn send(self, envelope: &Envelope) -> ProtocolResult<()> {
        let data = envelope.pack()?;
        self.send_packed(data);
        Ok(())
    }

    /// Send an already packed reply.
    pub fn send_packed(self, data: Vec<u8>) {
        self.deliver(Reply {
            data,
            written: None,
        });
    }

    /// Pack and send `envelope`, returning once it has been written out.
    ///
    /// Use this for the last reply before the endpoint is dropped: a reply
    /// that was only queued dies with the connection task.
    pub async fn send_and_flush(self, envelope: &Envelope) -> ProtocolResult<()> {
        let data = envelope.pack()?;
        self.send_packed_and_flush(data).await;
        Ok(())
    }

    /// Send an already packed reply and wait until it has been written out.
    ///
    /// Returns early if the requester has gone away.
    pub async fn send_packed_and_flush(self, data: Vec<u8>) {
        let (written_tx, written_rx) = oneshot::channel();
        self.deliver(Reply {
            data,
            written: Some(written_tx),
        });
        if written_rx.await.is_err() {
            debug!("Reply not written, peer gone");
        }
    }

    fn deliver(self, reply: Reply) {
        if self.reply.send(reply).is_err() {
            debug!("Requester went away, reply dropped");
        }
    }
}

/// A bound reply endpoint.
pub struct ReplyServer {
    address: Address,
    requests: mpsc::Receiver<Request>,
    accept_task: JoinHandle<()>,
}

impl ReplyServer {
    /// Bind `address` and start accepting connections.
    pub async fn bind(address: &Address) -> TransportResult<Self> {
        let listener = Listener::bind(address).await?;
        let address = listener
            .local_address(address)
            .map_err(|source| TransportError::Bind {
                address: address.clone(),
                source,
            })?;

        let (tx, requests) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        info!(address = %address, "Reply endpoint listening");
        let accept_task = tokio::spawn(accept_loop(listener, tx));

        Ok(Self {
            address,
            requests,
            accept_task,
        })
    }

    /// The bound address, with any wildcard port resolved.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Wait for the next request. Returns `None` once the listener has died.
    pub async fn recv(&mut self) -> Option<Request> {
        self.requests.recv().await
    }
}

impl Drop for ReplyServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(listener: Listener, tx: mpsc::Sender<Request>) {
    // Connection tasks live in the set so they are aborted with this task.
    let mut connections = JoinSet::new();

    loop {
        while connections.try_join_next().is_some() {}

        match listener.accept().await {
            Ok(conn) => {
                connections.spawn(serve_connection(conn, tx.clone()));
            }
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
}

async fn serve_connection(mut conn: Connection, tx: mpsc::Sender<Request>) {
    loop {
        let data = match read_frame(&mut conn).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!("Peer disconnected");
                return;
            }
            Err(e) => {
                debug!(error = %e, "Connection read error");
                return;
            }
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Request {
            envelope: Envelope::unpack(&data),
            responder: Responder { reply: reply_tx },
        };
        if tx.send(request).await.is_err() {
            return;
        }

        // Owner dropped the responder without answering: close the connection.
        let Ok(reply) = reply_rx.await else {
            return;
        };

        if let Err(e) = write_frame(&mut conn, &reply.data).await {
            debug!(error = %e, "Reply dropped, peer gone");
            return;
        }
        if let Some(written) = reply.written {
            let _ = written.send(());
        }
    }
}
