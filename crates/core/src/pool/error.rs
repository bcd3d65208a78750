//! Error types for launching component processes.

use std::path::PathBuf;
use thiserror::Error;

/// Why a component could not be launched.
///
/// The display text is what the daemon sends back in a failed
/// `process_start` reply.
#[derive(Error, Debug)]
pub enum ProcessLoadError {
    #[error("No crux.json found at \"{0}\"")]
    DescriptorMissing(PathBuf),

    #[error("Unable to read \"{path}\": {source}")]
    DescriptorUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unable to parse \"{path}\": {reason}")]
    DescriptorInvalid { path: PathBuf, reason: String },

    #[error("No startup command specified in \"{0}\"")]
    MissingStartup(PathBuf),

    #[error("Failed to prepare socket directory \"{path}\": {source}")]
    SocketDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to launch \"{command}\": {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
}
