//! # crux-protocol
//!
//! Wire-level definitions and data models shared by every crux peer.
//!
//! This crate defines:
//! - The [`Envelope`] exchanged between every pair of peers and its binary form
//! - The [`Payload`] tagged union carried inside envelopes
//! - Schema-driven I/O packing for component inputs and outputs
//! - Component descriptor ("cruxfile") and pipeline definition models
//! - Configuration models for `.crux/config.toml`
//!
//! ## Modules
//!
//! - [`payload`]: The structural value type carried on the wire
//! - [`envelope`]: Named, success-flagged message unit
//! - [`packing`]: csv/binary/text/json field packing against a schema
//! - [`descriptor_models`]: Component descriptor and field schemas
//! - [`pipeline_models`]: Pipeline definitions and editing operations
//! - [`config_models`]: Daemon, pool, agent and logging settings
//! - [`error`]: Protocol and pipeline-editing errors
//!
//! ## Design Principles
//!
//! - No I/O: everything here is pure data and codecs
//! - Independent compilation: No dependencies on other crux crates

pub mod config_models;
pub mod descriptor_models;
pub mod envelope;
pub mod error;
pub mod packing;
pub mod payload;
pub mod pipeline_models;

// Re-export all public types for convenience
pub use config_models::*;
pub use descriptor_models::*;
pub use envelope::*;
pub use error::*;
pub use packing::*;
pub use payload::*;
pub use pipeline_models::*;
