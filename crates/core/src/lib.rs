//! # crux-core
//!
//! Process management, transport and pipeline execution for crux.
//!
//! This crate provides:
//! - Length-prefixed request/reply and publish transports
//! - A process pool that launches components from their descriptors
//! - Both ends of the component protocol
//! - The daemon and its client stub
//! - The pipeline execution agent
//!
//! ## Modules
//!
//! - [`transport`]: Addresses, framing and socket endpoints
//! - [`pool`]: Process pool and supervision seam
//! - [`component`]: Worker (component side) and handle (orchestrator side)
//! - [`daemon`]: Daemon command loop and API client
//! - [`agent`]: Pipeline execution agent
//! - [`config`]: Config, descriptor and pipeline loading
//! - [`logging`]: Subscriber setup for binaries

pub mod agent;
pub mod component;
pub mod config;
pub mod daemon;
pub mod logging;
pub mod pool;
pub mod transport;
