//! Endpoint addresses.
//!
//! Two transports are supported:
//! - `tcp://HOST:PORT`, where a bind host of `*` means every interface
//! - `ipc:///path/to/socket`, a Unix domain socket file

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::error::TransportError;

/// A bind or connect address for a request/reply endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Address {
    Tcp { host: String, port: u16 },
    Ipc(PathBuf),
}

impl Address {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Address::Tcp {
            host: host.into(),
            port,
        }
    }

    pub fn ipc(path: impl Into<PathBuf>) -> Self {
        Address::Ipc(path.into())
    }

    /// Rewrite a bind address into one a local client can connect to.
    pub fn connectable(&self) -> Address {
        match self {
            Address::Tcp { host, port } if host == "*" || host == "0.0.0.0" => {
                Address::tcp("127.0.0.1", *port)
            }
            other => other.clone(),
        }
    }

    /// Host string suitable for binding a listener.
    pub(crate) fn bind_host(host: &str) -> &str {
        if host == "*" {
            "0.0.0.0"
        } else {
            host
        }
    }

    pub fn port(&self) -> Option<u16> {
        match self {
            Address::Tcp { port, .. } => Some(*port),
            Address::Ipc(_) => None,
        }
    }

    pub fn socket_path(&self) -> Option<&Path> {
        match self {
            Address::Ipc(path) => Some(path),
            Address::Tcp { .. } => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            Address::Ipc(path) => write!(f, "ipc://{}", path.display()),
        }
    }
}

impl FromStr for Address {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TransportError::InvalidAddress(s.to_string());

        if let Some(rest) = s.strip_prefix("tcp://") {
            let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
            if host.is_empty() {
                return Err(invalid());
            }
            let port = port.parse::<u16>().map_err(|_| invalid())?;
            Ok(Address::tcp(host, port))
        } else if let Some(path) = s.strip_prefix("ipc://") {
            if path.is_empty() {
                return Err(invalid());
            }
            Ok(Address::ipc(path))
        } else {
            Err(invalid())
        }
    }
}
