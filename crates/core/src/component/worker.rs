//! Component-side protocol.
//!
//! A component program creates a [`Worker`], then loops on [`Worker::wait`].
//! Each `Some(execution)` must be answered with exactly one call to
//! [`Worker::output`] or [`Worker::fail`] before waiting again.
//!
//! ```rust,no_run
//! use crux_core::component::Worker;
//! use crux_protocol::{Payload, PayloadMap};
//!
//! # async fn example() -> Result<(), crux_core::component::WorkerError> {
//! let mut worker = Worker::from_descriptor_file("crux.json", None).await?;
//! while let Some(execution) = worker.wait().await? {
//!     let mut output = PayloadMap::new();
//!     output.insert("echo".to_string(), Payload::Mapping(execution.inputs));
//!     worker.output(output)?;
//! }
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use crux_protocol::{names, Descriptor, Envelope, Payload, PayloadMap};
use tracing::{debug, info, warn};

use crate::component::error::WorkerError;
use crate::config::load_descriptor;
use crate::transport::{Address, ReplyServer, Responder, TransportError};

/// Environment variable through which the process pool passes the bind address.
pub const BIND_ENV_VAR: &str = "CRUX_BIND";

/// One `execute` request, decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// Inputs decoded against the input schema.
    pub inputs: PayloadMap,

    /// Parameters with declared defaults filled in.
    pub parameters: PayloadMap,
}

enum WorkerState {
    Idle,
    Busy(Responder),
}

pub struct Worker {
    descriptor: Descriptor,
    server: ReplyServer,
    state: WorkerState,
}

impl Worker {
    /// Load the descriptor at `path` and bind.
    pub async fn from_descriptor_file(
        path: impl AsRef<Path>,
        bind: Option<Address>,
    ) -> Result<Self, WorkerError> {
        let descriptor = load_descriptor(path.as_ref())?;
        Self::bind(descriptor, bind).await
    }

    /// Bind a worker for `descriptor`.
    ///
    /// Without an explicit `bind` address the `CRUX_BIND` environment
    /// variable is used.
    ///
    /// # Errors
    ///
    /// Returns `Instantiation` if no bind address is available or it does
    /// not parse, and `Transport` if binding fails.
    pub async fn bind(descriptor: Descriptor, bind: Option<Address>) -> Result<Self, WorkerError> {
        let bind = match bind {
            Some(bind) => bind,
            None => {
                let value = std::env::var(BIND_ENV_VAR).map_err(|_| {
                    WorkerError::Instantiation(format!(
                        "no bind address given and {} is not set",
                        BIND_ENV_VAR
                    ))
                })?;
                value
                    .parse()
                    .map_err(|e| WorkerError::Instantiation(format!("{}: {}", BIND_ENV_VAR, e)))?
            }
        };

        let server = ReplyServer::bind(&bind).await?;
        info!(component = %descriptor.name, address = %server.address(), "Worker ready");

        Ok(Self {
            descriptor,
            server,
            state: WorkerState::Idle,
        })
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn address(&self) -> &Address {
        self.server.address()
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, WorkerState::Busy(_))
    }

    fn endpoint_closed(&self) -> WorkerError {
        warn!(address = %self.address(), "Reply endpoint stopped accepting connections");
        TransportError::Closed(self.address().clone()).into()
    }

    /// Serve requests until an `execute` or `shutdown` arrives.
    ///
    /// Descriptor queries are answered internally. Returns `Ok(None)` after
    /// acknowledging `shutdown`.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolViolation` if the previous execution has not been
    /// answered yet, and `Transport(Closed)` if the endpoint stopped
    /// accepting connections.
    pub async fn wait(&mut self) -> Result<Option<Execution>, WorkerError> {
        if self.is_busy() {
            return Err(WorkerError::ProtocolViolation(
                "wait() called before the pending execution was answered".to_string(),
            ));
        }

        loop {
            let Some(request) = self.server.recv().await else {
                return Err(self.endpoint_closed());
            };

            let envelope = match request.envelope {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, "Undecodable request");
                    request
                        .responder
                        .send(&Envelope::failure(names::MALFORMED, Some(e.to_string())))?;
                    continue;
                }
            };
            debug!(name = %envelope.name, "Request received");

            match envelope.name.as_str() {
                names::EXECUTE => match self.prepare(envelope.payload) {
                    Ok(execution) => {
                        self.state = WorkerState::Busy(request.responder);
                        return Ok(Some(execution));
                    }
                    Err(reason) => {
                        warn!(reason = %reason, "Malformed execute request");
                        request
                            .responder
                            .send(&Envelope::failure(names::MALFORMED, Some(reason)))?;
                    }
                },
                names::GET_DESCRIPTOR => {
                    request
                        .responder
                        .send(&Envelope::reply(self.descriptor.to_payload()))?;
                }
                names::SHUTDOWN => {
                    request
                        .responder
                        .send_and_flush(&Envelope::new(names::ACK))
                        .await?;
                    info!(component = %self.descriptor.name, "Worker shutting down");
                    return Ok(None);
                }
                other => {
                    request.responder.send(&Envelope::failure(
                        names::NOT_IMPLEMENTED,
                        Some(format!("unknown request '{}'", other)),
                    ))?;
                }
            }
        }
    }

    /// Answer the pending execution with `output`.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolViolation` if nothing is pending. If `output` does
    /// not match the output schema a failure reply is sent instead and the
    /// packing error is returned; the worker is idle either way.
    pub fn output(&mut self, output: PayloadMap) -> Result<(), WorkerError> {
        let responder = self.take_pending("output")?;

        match Envelope::reply(output).pack_io(&self.descriptor.outputs) {
            Ok(data) => {
                responder.send_packed(data);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Output does not match schema");
                responder.send(&Envelope::failure(
                    names::RETURN,
                    Some(format!("invalid output: {}", e)),
                ))?;
                Err(e.into())
            }
        }
    }

    /// Answer the pending execution with a failure.
    pub fn fail(&mut self, message: Option<String>) -> Result<(), WorkerError> {
        let responder = self.take_pending("fail")?;
        responder.send(&Envelope::failure(names::RETURN, message))?;
        Ok(())
    }

    fn take_pending(&mut self, action: &str) -> Result<Responder, WorkerError> {
        match std::mem::replace(&mut self.state, WorkerState::Idle) {
            WorkerState::Busy(responder) => Ok(responder),
            WorkerState::Idle => Err(WorkerError::ProtocolViolation(format!(
                "{}() called with no pending execution",
                action
            ))),
        }
    }

    /// Validate an `execute` payload and decode it.
    fn prepare(&self, payload: Option<Payload>) -> Result<Execution, String> {
        let mut body = match payload {
            Some(Payload::Mapping(body)) => body,
            _ => return Err("execute payload must be a mapping".to_string()),
        };

        let (Some(parameters), Some(inputs)) = (body.remove("parameters"), body.remove("inputs"))
        else {
            return Err("execute payload needs 'parameters' and 'inputs'".to_string());
        };

        let inputs = match inputs {
            Payload::Null => PayloadMap::new(),
            Payload::Mapping(map) => crux_protocol::unpack_io(&map, &self.descriptor.inputs)
                .map_err(|e| e.to_string())?,
            _ => return Err("'inputs' must be a mapping".to_string()),
        };

        let mut parameters = match parameters {
            Payload::Null => PayloadMap::new(),
            Payload::Mapping(map) => map,
            _ => return Err("'parameters' must be a mapping".to_string()),
        };
        for (name, spec) in &self.descriptor.parameters {
            if let Some(default) = &spec.default {
                parameters
                    .entry(name.clone())
                    .or_insert_with(|| Payload::from(default.clone()));
            }
        }

        Ok(Execution { inputs, parameters })
    }
}
