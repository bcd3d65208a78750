//! Message transport between crux processes.
//!
//! Envelopes travel as length-prefixed frames over TCP or Unix domain
//! sockets. Three endpoint kinds are built on top:
//!
//! - [`ReplyServer`]: answers requests one at a time
//! - [`ManagedSocket`]: sends requests and survives reply timeouts
//! - [`Publisher`] / [`Subscriber`]: one-way notifications

pub mod address;
pub mod connection;
pub mod error;
pub mod frame;
pub mod publish;
pub mod server;
pub mod socket;

pub use address::Address;
pub use error::{TransportError, TransportResult};
pub use publish::{Publisher, Subscriber};
pub use server::{ReplyServer, Request, Responder};
pub use socket::{ChannelOptions, ManagedSocket};
