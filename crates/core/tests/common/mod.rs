//! Common test utilities shared by the integration tests.
//!
//! This module provides:
//! - Fixtures (component directories, descriptors, pipeline definitions)
//! - In-process workers that stand in for component processes
//! - Custom assertions

pub mod assertions;
pub mod fixtures;
pub mod workers;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use workers::*;
