//! The component protocol.
//!
//! - [`Worker`]: runs inside a component process and answers requests
//! - [`ComponentHandle`]: used by orchestrators to talk to a component

pub mod error;
pub mod handle;
pub mod worker;

pub use error::{HandleError, WorkerError};
pub use handle::ComponentHandle;
pub use worker::{Execution, Worker, BIND_ENV_VAR};
