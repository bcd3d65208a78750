//! The crux daemon.
//!
//! A long-running process that owns one [`ProcessPool`] and serves
//! administrative commands over a reply endpoint, one request at a time.
//! State changes are also broadcast on an optional publish endpoint.

pub mod api;

use std::future::Future;
use std::path::Path;

use crux_protocol::{names, DaemonSettings, Envelope, Payload, ProtocolError};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::pool::ProcessPool;
use crate::transport::{Address, Publisher, ReplyServer, TransportError};

pub use api::{ApiError, DaemonApi};

/// Errors that can occur while running the daemon.
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Command endpoint closed unexpectedly")]
    EndpointClosed,
}

pub struct Daemon {
    server: ReplyServer,
    publisher: Option<Publisher>,
    pool: ProcessPool,
    should_stop: bool,
}

impl Daemon {
    /// Bind the command endpoint and, if given, the publish endpoint.
    pub async fn bind(
        bind: &Address,
        publish: Option<&Address>,
        pool: ProcessPool,
    ) -> Result<Self, DaemonError> {
        let server = ReplyServer::bind(bind).await?;
        let publisher = match publish {
            Some(address) => Some(Publisher::bind(address).await?),
            None => None,
        };

        info!(
            address = %server.address(),
            publish = ?publisher.as_ref().map(|p| p.address().to_string()),
            transport = ?pool.transport(),
            "Daemon bound"
        );

        Ok(Self {
            server,
            publisher,
            pool,
            should_stop: false,
        })
    }

    /// Bind using the `[daemon]` section of the config file.
    pub async fn from_settings(settings: &DaemonSettings, pool: ProcessPool) -> Result<Self, DaemonError> {
        let bind: Address = settings.bind.parse()?;
        let publish: Address = settings.publish.parse()?;
        Self::bind(&bind, Some(&publish), pool).await
    }

    pub fn address(&self) -> &Address {
        self.server.address()
    }

    pub fn publish_address(&self) -> Option<&Address> {
        self.publisher.as_ref().map(Publisher::address)
    }

    /// Serve commands until `daemon_shutdown` is received.
    pub async fn listen(self) -> Result<(), DaemonError> {
        self.listen_until(std::future::pending()).await
    }

    /// Serve commands until `daemon_shutdown` is received or `shutdown`
    /// completes, whichever comes first.
    ///
    /// Managed processes still running when the loop ends are terminated.
    pub async fn listen_until<F>(mut self, shutdown: F) -> Result<(), DaemonError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(address = %self.server.address(), "Daemon listening");

        let outcome = loop {
            if self.should_stop {
                break Ok(());
            }

            let request = tokio::select! {
                request = self.server.recv() => request,
                _ = &mut shutdown => {
                    warn!("Interrupted, flushing process pool");
                    break Ok(());
                }
            };
            let Some(request) = request else {
                break Err(DaemonError::EndpointClosed);
            };

            let reply = match request.envelope {
                Ok(envelope) => self.handle(envelope),
                Err(e) => {
                    warn!(error = %e, "Undecodable command");
                    Envelope::failure(names::MALFORMED, Some(e.to_string()))
                }
            };

            let data = match reply.pack() {
                Ok(data) => data,
                Err(e) => {
                    error!(error = %e, "Failed to pack reply");
                    match Envelope::failure(names::INTERNAL_ERROR, None).pack() {
                        Ok(data) => data,
                        Err(e) => {
                            error!(error = %e, "Failed to pack internal_error reply");
                            continue;
                        }
                    }
                }
            };

            // The acknowledgement of a shutdown must be on the wire before the
            // endpoint is dropped.
            if self.should_stop {
                request.responder.send_packed_and_flush(data).await;
            } else {
                request.responder.send_packed(data);
            }
        };

        self.pool.terminate_all();
        info!("Daemon stopped");
        outcome
    }

    /// Dispatch one command. Faults become an `internal_error` reply.
    fn handle(&mut self, envelope: Envelope) -> Envelope {
        debug!(name = %envelope.name, "Command received");
        match self.dispatch(envelope) {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, "Command failed");
                Envelope::failure(names::INTERNAL_ERROR, Some(e.to_string()))
            }
        }
    }

    fn dispatch(&mut self, envelope: Envelope) -> Result<Envelope, DaemonError> {
        match envelope.name.as_str() {
            names::PROCESS_START => {
                let Some(path) = envelope.message() else {
                    return Ok(Envelope::failure(
                        names::MALFORMED,
                        Some("process_start needs a path".to_string()),
                    ));
                };

                match self.pool.launch(Path::new(path)) {
                    Ok(address) => {
                        self.notify(
                            Envelope::new(names::PROCESS_STARTED).with_payload(address.to_string()),
                        )?;
                        Ok(Envelope::reply(address.to_string()))
                    }
                    Err(e) => {
                        warn!(path = %path, error = %e, "Launch failed");
                        Ok(Envelope::failure(names::FAILURE, Some(e.to_string())))
                    }
                }
            }
            names::PROCESS_LIST => {
                let addresses = self
                    .pool
                    .get_all_addrs()
                    .into_iter()
                    .map(|a| Payload::String(a.to_string()))
                    .collect::<Vec<_>>();
                Ok(Envelope::reply(addresses))
            }
            names::PROCESS_KILLALL => {
                self.pool.terminate_all();
                self.notify(Envelope::new(names::PROCESS_KILLALL))?;
                Ok(Envelope::new(names::ACK))
            }
            names::DAEMON_SHUTDOWN => {
                info!("Shutdown requested");
                self.should_stop = true;
                self.notify(Envelope::new(names::DAEMON_SHUTDOWN))?;
                Ok(Envelope::new(names::ACK))
            }
            other => Ok(Envelope::failure(
                names::NOT_IMPLEMENTED,
                Some(format!("unknown command '{}'", other)),
            )),
        }
    }

    fn notify(&self, envelope: Envelope) -> Result<(), DaemonError> {
        if let Some(publisher) = &self.publisher {
            let delivered = publisher.publish(&envelope)?;
            debug!(name = %envelope.name, subscribers = delivered, "Notification published");
        }
        Ok(())
    }
}
