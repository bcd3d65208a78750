//! Byte-stream connections and listeners over TCP or Unix sockets.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::address::Address;
use super::error::{TransportError, TransportResult};

/// Any bidirectional byte stream we can frame messages over.
pub trait Duplex: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Duplex for T {}

pub type Connection = Box<dyn Duplex>;

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// Pause after a failed `accept` before trying again, so that exhausted file
/// descriptors do not turn the accept loop into a busy spin.
pub(crate) const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Open a single connection to `address`.
pub async fn connect(address: &Address) -> io::Result<Connection> {
    match address.connectable() {
        Address::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), port)).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream))
        }
        Address::Ipc(path) => {
            let stream = UnixStream::connect(&path).await?;
            Ok(Box::new(stream))
        }
    }
}

/// Connect to `address`, retrying until `timeout` elapses.
///
/// Peers are often spawned moments before the first connection attempt, so
/// "nobody is listening yet" errors are retried with exponential backoff.
/// Any other error fails immediately.
pub async fn connect_with_retry(address: &Address, timeout: Duration) -> TransportResult<Connection> {
    let deadline = Instant::now() + timeout;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        match connect(address).await {
            Ok(conn) => {
                debug!(address = %address, "Connected");
                return Ok(conn);
            }
            Err(e) if is_not_ready(&e) && Instant::now() + backoff < deadline => {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            Err(source) => {
                return Err(TransportError::Connect {
                    address: address.clone(),
                    source,
                })
            }
        }
    }
}

fn is_not_ready(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
    )
}

/// A bound listener. Unix socket files are removed when the listener drops.
pub enum Listener {
    Tcp(TcpListener),
    Unix { listener: UnixListener, path: PathBuf },
}

impl Listener {
    /// Bind to `address`.
    ///
    /// For IPC addresses the parent directory is created if needed and a
    /// stale socket file left by a previous run is removed.
    pub async fn bind(address: &Address) -> TransportResult<Self> {
        let bind_err = |source| TransportError::Bind {
            address: address.clone(),
            source,
        };

        match address {
            Address::Tcp { host, port } => {
                let listener = TcpListener::bind((Address::bind_host(host), *port))
                    .await
                    .map_err(bind_err)?;
                Ok(Listener::Tcp(listener))
            }
            Address::Ipc(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(bind_err)?;
                }
                if path.exists() {
                    warn!(path = %path.display(), "Removing stale socket file");
                    std::fs::remove_file(path).map_err(bind_err)?;
                }
                let listener = UnixListener::bind(path).map_err(bind_err)?;
                Ok(Listener::Unix {
                    listener,
                    path: path.clone(),
                })
            }
        }
    }

    pub async fn accept(&self) -> io::Result<Connection> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                // A peer that reset right away can fail this; it only costs latency.
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(peer = %peer, error = %e, "Could not disable Nagle");
                }
                Ok(Box::new(stream))
            }
            Listener::Unix { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                Ok(Box::new(stream))
            }
        }
    }

    /// The address actually bound. Resolves port `0` to the assigned port.
    pub fn local_address(&self, requested: &Address) -> io::Result<Address> {
        match (self, requested) {
            (Listener::Tcp(listener), Address::Tcp { host, .. }) => {
                Ok(Address::tcp(host.clone(), listener.local_addr()?.port()))
            }
            _ => Ok(requested.clone()),
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Listener::Unix { path, .. } = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::frame::{read_frame, write_frame};

    #[tokio::test]
    async fn test_ipc_listener_round_trip_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let address = Address::ipc(dir.path().join("nested").join("sock"));

        let listener = Listener::bind(&address).await.unwrap();
        let server = tokio::spawn(async move {
            let mut conn = listener.accept().await.unwrap();
            let frame = read_frame(&mut conn).await.unwrap().unwrap();
            write_frame(&mut conn, &frame).await.unwrap();
            listener
        });

        let mut client = connect(&address).await.unwrap();
        write_frame(&mut client, b"ping").await.unwrap();
        assert_eq!(read_frame(&mut client).await.unwrap(), Some(b"ping".to_vec()));

        let listener = server.await.unwrap();
        let path = dir.path().join("nested").join("sock");
        assert!(path.exists());
        drop(listener);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_tcp_wildcard_bind_resolves_port() {
        let requested = Address::tcp("*", 0);
        let listener = Listener::bind(&requested).await.unwrap();
        let bound = listener.local_address(&requested).unwrap();

        assert_ne!(bound.port(), Some(0));
        assert!(connect(&bound).await.is_ok());
    }

    #[tokio::test]
    async fn test_connect_with_retry_waits_for_late_listener() {
        let dir = tempfile::tempdir().unwrap();
        let address = Address::ipc(dir.path().join("late"));

        let bind_addr = address.clone();
        let server = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let listener = Listener::bind(&bind_addr).await.unwrap();
            let _conn = listener.accept().await.unwrap();
        });

        let result = connect_with_retry(&address, Duration::from_secs(5)).await;
        assert!(result.is_ok());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_with_retry_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let address = Address::ipc(dir.path().join("nobody"));

        let err = connect_with_retry(&address, Duration::from_millis(50))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
