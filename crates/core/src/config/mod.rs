//! Configuration loading.
//!
//! This module reads the optional `.crux/config.toml` settings file,
//! component descriptors (`crux.json`) and pipeline definitions.

pub mod error;
pub mod loader;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    descriptor_path, load_config, load_descriptor, load_pipeline, read_descriptor_file,
    DESCRIPTOR_FILE_NAME,
};
