//! Configuration models for `.crux/config.toml`.
//!
//! Every section and field has a default, so an empty or absent file yields
//! a working configuration.
//!
//! # Example
//!
//! ```toml
//! # .crux/config.toml
//! [daemon]
//! bind = "tcp://*:30020"
//! publish = "tcp://*:30021"
//!
//! [pool]
//! transport = "ipc"
//!
//! [agent]
//! request_timeout_ms = 5000
//!
//! [logging]
//! level = "debug"
//! ```

use serde::{Deserialize, Serialize};

/// Default administrative endpoint of the daemon.
pub const DEFAULT_DAEMON_BIND: &str = "tcp://*:30020";

/// Default notification endpoint of the daemon (adjacent port).
pub const DEFAULT_DAEMON_PUBLISH: &str = "tcp://*:30021";

/// How the process pool addresses the components it launches.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Loopback TCP on a random high port.
    #[default]
    Tcp,
    /// Unix domain socket file under a shared temp directory.
    Ipc,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DaemonSettings {
    pub bind: String,
    pub publish: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_DAEMON_BIND.to_string(),
            publish: DEFAULT_DAEMON_PUBLISH.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PoolSettings {
    pub transport: TransportKind,

    /// Lowest port handed out for TCP transport (inclusive).
    pub port_min: u16,

    /// Highest port handed out for TCP transport (exclusive).
    pub port_max: u16,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            transport: TransportKind::Tcp,
            port_min: 50000,
            port_max: 65535,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AgentSettings {
    /// Per-request deadline in milliseconds. `0` waits forever.
    pub request_timeout_ms: u64,

    /// How long a client keeps retrying to reach a peer that is not yet
    /// listening, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 0,
            connect_timeout_ms: 30_000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Represents all settings from `.crux/config.toml`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CruxConfig {
    pub daemon: DaemonSettings,
    pub pool: PoolSettings,
    pub agent: AgentSettings,
    pub logging: LoggingSettings,
}
