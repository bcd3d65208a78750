//! The process pool.
//!
//! A `ProcessPool` launches components from their descriptors, remembers the
//! child process behind each connect address, and offers best-effort bulk
//! operations over all of them.

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crux_protocol::{PoolSettings, TransportKind};
use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::component::BIND_ENV_VAR;
use crate::config::{descriptor_path, read_descriptor_file, ConfigError};
use crate::pool::error::ProcessLoadError;
use crate::pool::supervisor::{LaunchSpec, ManagedProcess, OsSupervisor, Supervisor};
use crate::transport::Address;

/// Attempts at finding a port not already used by this pool.
const PORT_ATTEMPTS: usize = 64;

struct PoolEntry {
    name: String,
    process: Box<dyn ManagedProcess>,
}

/// Launches and tracks component processes.
///
/// Entries are keyed by the address clients connect to. The pool is owned by
/// a single task; it is not shared across threads.
pub struct ProcessPool {
    processes: BTreeMap<Address, PoolEntry>,
    transport: TransportKind,
    ports: Range<u16>,
    ipc_dir: PathBuf,
    supervisor: Box<dyn Supervisor>,
}

impl ProcessPool {
    /// Create a pool with default port range and socket directory.
    pub fn new(transport: TransportKind) -> Self {
        Self::from_settings(&PoolSettings {
            transport,
            ..PoolSettings::default()
        })
    }

    pub fn from_settings(settings: &PoolSettings) -> Self {
        let ports = if settings.port_min < settings.port_max {
            settings.port_min..settings.port_max
        } else {
            warn!(
                port_min = settings.port_min,
                port_max = settings.port_max,
                "Empty port range, falling back to defaults"
            );
            let defaults = PoolSettings::default();
            defaults.port_min..defaults.port_max
        };

        Self {
            processes: BTreeMap::new(),
            transport: settings.transport,
            ports,
            ipc_dir: std::env::temp_dir().join("crux_ipc"),
            supervisor: Box::new(OsSupervisor),
        }
    }

    /// Replace the process supervisor.
    pub fn with_supervisor(mut self, supervisor: Box<dyn Supervisor>) -> Self {
        self.supervisor = supervisor;
        self
    }

    /// Directory that receives socket files for IPC transport.
    pub fn with_ipc_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ipc_dir = dir.into();
        self
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Allocate a fresh bind address.
    ///
    /// TCP ports are drawn at random from the configured range and only
    /// re-drawn when this pool already uses them. Whether anything else on
    /// the host holds the port is not checked.
    pub fn create_bind(&self) -> Address {
        match self.transport {
            TransportKind::Ipc => Address::ipc(self.ipc_dir.join(Uuid::new_v4().to_string())),
            TransportKind::Tcp => {
                let mut rng = rand::rng();
                let mut bind = Address::tcp("*", rng.random_range(self.ports.clone()));
                for _ in 1..PORT_ATTEMPTS {
                    if !self.processes.contains_key(&bind.connectable()) {
                        break;
                    }
                    bind = Address::tcp("*", rng.random_range(self.ports.clone()));
                }
                bind
            }
        }
    }

    /// Launch the component at `path` and return the address to reach it.
    ///
    /// Returns as soon as the process has been spawned. The first request
    /// sent to the address waits until the component is listening.
    ///
    /// # Arguments
    ///
    /// * `path` - Component directory, or its descriptor file
    ///
    /// # Errors
    ///
    /// Returns `ProcessLoadError` if the descriptor is missing, unparsable or
    /// has no startup command, or if the process cannot be spawned. No pool
    /// entry is created in that case.
    pub fn launch(&mut self, path: &Path) -> Result<Address, ProcessLoadError> {
        let file = descriptor_path(path);
        if !file.is_file() {
            return Err(ProcessLoadError::DescriptorMissing(file));
        }

        let descriptor = read_descriptor_file(&file).map_err(|e| match e {
            ConfigError::FileRead { path, source } => {
                ProcessLoadError::DescriptorUnreadable { path, source }
            }
            other => ProcessLoadError::DescriptorInvalid {
                path: file.clone(),
                reason: other.to_string(),
            },
        })?;

        let command = match descriptor.startup {
            Some(startup) if !startup.trim().is_empty() => startup,
            _ => return Err(ProcessLoadError::MissingStartup(file)),
        };

        let bind = self.create_bind();
        if let Address::Ipc(socket) = &bind {
            if let Some(dir) = socket.parent() {
                std::fs::create_dir_all(dir).map_err(|source| ProcessLoadError::SocketDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
        }

        let spec = LaunchSpec {
            command: command.clone(),
            working_dir: component_dir(&file),
            env: vec![(BIND_ENV_VAR.to_string(), bind.to_string())],
        };

        let process = self
            .supervisor
            .start(&spec)
            .map_err(|source| ProcessLoadError::Spawn { command, source })?;

        let address = bind.connectable();
        info!(
            component = %descriptor.name,
            address = %address,
            pid = ?process.id(),
            "Launched component"
        );
        self.processes.insert(
            address.clone(),
            PoolEntry {
                name: descriptor.name,
                process,
            },
        );
        Ok(address)
    }

    /// Drop entries whose process has exited.
    pub fn poll_all(&mut self) {
        self.processes.retain(|address, entry| match entry.process.poll_exit() {
            Ok(None) => true,
            Ok(Some(status)) => {
                info!(component = %entry.name, address = %address, %status, "Component exited");
                false
            }
            Err(e) => {
                warn!(component = %entry.name, address = %address, error = %e, "Failed to poll component, dropping it");
                false
            }
        });
    }

    /// Ask every managed process to stop.
    pub fn terminate_all(&mut self) {
        self.signal_all(true);
    }

    /// Force-stop every managed process.
    pub fn kill_all(&mut self) {
        self.signal_all(false);
    }

    fn signal_all(&mut self, graceful: bool) {
        info!(count = self.processes.len(), graceful, "Stopping all components");
        for (address, entry) in self.processes.iter_mut() {
            if let Err(e) = entry.process.terminate(graceful) {
                debug!(address = %address, error = %e, "Signal not delivered");
            }
        }
    }

    /// Addresses of every process still running.
    pub fn get_all_addrs(&mut self) -> Vec<Address> {
        self.poll_all();
        self.processes.keys().cloned().collect()
    }

    /// Wait for every managed process to exit, then forget them.
    pub async fn wait_all(&mut self) {
        for (address, mut entry) in std::mem::take(&mut self.processes) {
            match entry.process.wait().await {
                Ok(status) => debug!(address = %address, %status, "Component reaped"),
                Err(e) => warn!(address = %address, error = %e, "Failed to wait for component"),
            }
        }
    }
}

impl std::fmt::Debug for ProcessPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessPool")
            .field("transport", &self.transport)
            .field("processes", &self.processes.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Directory a component runs in: the one holding its descriptor.
fn component_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    /// Shared view of what a fake process has been asked to do.
    #[derive(Default)]
    struct FakeState {
        launched: Vec<LaunchSpec>,
        exited: Vec<bool>,
        signals: Vec<bool>,
        fail_signals: bool,
    }

    #[derive(Clone, Default)]
    struct FakeSupervisor(Arc<Mutex<FakeState>>);

    struct FakeProcess {
        index: usize,
        state: Arc<Mutex<FakeState>>,
    }

    impl Supervisor for FakeSupervisor {
        fn start(&self, spec: &LaunchSpec) -> io::Result<Box<dyn ManagedProcess>> {
            let mut state = self.0.lock().unwrap();
            state.launched.push(spec.clone());
            state.exited.push(false);
            Ok(Box::new(FakeProcess {
                index: state.launched.len() - 1,
                state: Arc::clone(&self.0),
            }))
        }
    }

    #[async_trait]
    impl ManagedProcess for FakeProcess {
        fn id(&self) -> Option<u32> {
            Some(1000 + self.index as u32)
        }

        fn poll_exit(&mut self) -> io::Result<Option<ExitStatus>> {
            let state = self.state.lock().unwrap();
            Ok(state.exited[self.index].then(|| ExitStatus::from_raw(0)))
        }

        fn terminate(&mut self, graceful: bool) -> io::Result<()> {
            let mut state = self.state.lock().unwrap();
            state.signals.push(graceful);
            if state.fail_signals {
                return Err(io::Error::from(io::ErrorKind::NotFound));
            }
            state.exited[self.index] = true;
            Ok(())
        }

        async fn wait(&mut self) -> io::Result<ExitStatus> {
            Ok(ExitStatus::from_raw(0))
        }
    }

    fn write_component(dir: &Path, startup: Option<&str>) {
        let mut descriptor = serde_json::json!({ "name": "fake", "version": "1.0.0" });
        if let Some(startup) = startup {
            descriptor["startup"] = serde_json::json!(startup);
        }
        std::fs::write(dir.join("crux.json"), descriptor.to_string()).unwrap();
    }

    fn fake_pool(transport: TransportKind) -> (ProcessPool, FakeSupervisor) {
        let supervisor = FakeSupervisor::default();
        let pool = ProcessPool::new(transport).with_supervisor(Box::new(supervisor.clone()));
        (pool, supervisor)
    }

    #[test]
    fn test_launch_without_descriptor_creates_no_entry() {
        let dir = tempdir().unwrap();
        let (mut pool, supervisor) = fake_pool(TransportKind::Tcp);

        let err = pool.launch(dir.path()).unwrap_err();
        assert!(matches!(err, ProcessLoadError::DescriptorMissing(_)));
        assert!(pool.is_empty());
        assert!(supervisor.0.lock().unwrap().launched.is_empty());
    }

    #[test]
    fn test_launch_without_startup_fails() {
        let dir = tempdir().unwrap();
        write_component(dir.path(), None);
        let (mut pool, _) = fake_pool(TransportKind::Tcp);

        let err = pool.launch(dir.path()).unwrap_err();
        assert!(matches!(err, ProcessLoadError::MissingStartup(_)));
        assert!(err.to_string().contains("No startup command"));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_launch_with_unparsable_descriptor_fails() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("crux.json"), "{ not json").unwrap();
        let (mut pool, _) = fake_pool(TransportKind::Tcp);

        let err = pool.launch(dir.path()).unwrap_err();
        assert!(matches!(err, ProcessLoadError::DescriptorInvalid { .. }));
    }

    #[test]
    fn test_launch_tcp_injects_bind_and_returns_loopback() {
        let dir = tempdir().unwrap();
        write_component(dir.path(), Some("python3 main.py"));
        let (mut pool, supervisor) = fake_pool(TransportKind::Tcp);

        let address = pool.launch(dir.path()).unwrap();

        let state = supervisor.0.lock().unwrap();
        let spec = &state.launched[0];
        assert_eq!(spec.command, "python3 main.py");
        assert_eq!(spec.working_dir, dir.path());
        let (key, bind) = &spec.env[0];
        assert_eq!(key, BIND_ENV_VAR);

        let bind: Address = bind.parse().unwrap();
        assert!(matches!(&bind, Address::Tcp { host, .. } if host == "*"));
        let port = bind.port().unwrap();
        assert!((50000..65535).contains(&port));
        assert_eq!(address, Address::tcp("127.0.0.1", port));
    }

    #[test]
    fn test_bare_descriptor_name_runs_in_current_dir() {
        assert_eq!(component_dir(Path::new("crux.json")), Path::new("."));
        assert_eq!(component_dir(Path::new("loader/crux.json")), Path::new("loader"));
        assert_eq!(component_dir(Path::new("/opt/loader/crux.json")), Path::new("/opt/loader"));
    }

    #[test]
    fn test_launch_ipc_uses_socket_dir() {
        let dir = tempdir().unwrap();
        let sockets = tempdir().unwrap();
        write_component(dir.path(), Some("run"));
        let (pool, _) = fake_pool(TransportKind::Ipc);
        let mut pool = pool.with_ipc_dir(sockets.path());

        let first = pool.launch(&dir.path().join("crux.json")).unwrap();
        let second = pool.launch(dir.path()).unwrap();

        assert_ne!(first, second);
        assert!(first.socket_path().unwrap().starts_with(sockets.path()));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_terminate_all_then_poll_empties_pool() {
        let dir = tempdir().unwrap();
        write_component(dir.path(), Some("run"));
        let (mut pool, supervisor) = fake_pool(TransportKind::Tcp);
        pool.launch(dir.path()).unwrap();
        pool.launch(dir.path()).unwrap();
        assert_eq!(pool.get_all_addrs().len(), 2);

        pool.terminate_all();

        assert!(pool.get_all_addrs().is_empty());
        assert_eq!(supervisor.0.lock().unwrap().signals, vec![true, true]);
    }

    #[test]
    fn test_kill_all_swallows_signal_failures() {
        let dir = tempdir().unwrap();
        write_component(dir.path(), Some("run"));
        let (mut pool, supervisor) = fake_pool(TransportKind::Tcp);
        pool.launch(dir.path()).unwrap();
        supervisor.0.lock().unwrap().fail_signals = true;

        pool.kill_all();

        assert_eq!(supervisor.0.lock().unwrap().signals, vec![false]);
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_wait_all_forgets_processes() {
        let dir = tempdir().unwrap();
        write_component(dir.path(), Some("run"));
        let (mut pool, _) = fake_pool(TransportKind::Tcp);
        pool.launch(dir.path()).unwrap();

        pool.wait_all().await;
        assert!(pool.is_empty());
    }
}
