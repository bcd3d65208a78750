//! Platform seam for starting and stopping component processes.
//!
//! The process pool never touches the OS directly; it goes through a
//! [`Supervisor`] so that tests can substitute fake processes.

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use tokio::process::{Child, Command};

/// Everything needed to start one component process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Shell command line, run through `sh -c`.
    pub command: String,

    pub working_dir: PathBuf,

    /// Extra environment variables on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

/// A running (or finished) child process.
#[async_trait]
pub trait ManagedProcess: Send {
    /// OS process id, if the process has not been reaped yet.
    fn id(&self) -> Option<u32>;

    /// Non-blocking exit check. `Ok(None)` means still running.
    fn poll_exit(&mut self) -> io::Result<Option<ExitStatus>>;

    /// Ask the process to stop (`graceful`) or stop it unconditionally.
    fn terminate(&mut self, graceful: bool) -> io::Result<()>;

    async fn wait(&mut self) -> io::Result<ExitStatus>;
}

/// Starts processes.
pub trait Supervisor: Send + Sync {
    fn start(&self, spec: &LaunchSpec) -> io::Result<Box<dyn ManagedProcess>>;
}

/// Supervisor backed by real OS processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSupervisor;

impl Supervisor for OsSupervisor {
    fn start(&self, spec: &LaunchSpec) -> io::Result<Box<dyn ManagedProcess>> {
        // `exec` replaces the shell so signals reach the component itself.
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(format!("exec {}", spec.command));
        cmd.current_dir(&spec.working_dir);
        cmd.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let child = cmd.spawn()?;
        Ok(Box::new(OsProcess { child }))
    }
}

struct OsProcess {
    child: Child,
}

#[async_trait]
impl ManagedProcess for OsProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn poll_exit(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    fn terminate(&mut self, graceful: bool) -> io::Result<()> {
        if !graceful {
            return self.child.start_kill();
        }

        let Some(pid) = self.child.id() else {
            // Already reaped
            return Ok(());
        };
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

        // SAFETY: kill(2) has no memory-safety preconditions; pid belongs to
        // a child we have not reaped.
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }
}
