//! Launching and supervising component processes.

pub mod error;
pub mod manager;
pub mod supervisor;

pub use error::ProcessLoadError;
pub use manager::ProcessPool;
pub use supervisor::{LaunchSpec, ManagedProcess, OsSupervisor, Supervisor};
