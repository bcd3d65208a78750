//! How the agent gets components running.

use async_trait::async_trait;
use std::path::Path;

use crate::daemon::DaemonApi;
use crate::pool::ProcessPool;
use crate::transport::Address;

/// Something that can start a component from its source path and say where
/// it listens.
#[async_trait]
pub trait ComponentLauncher: Send {
    async fn launch(&mut self, src: &str) -> anyhow::Result<Address>;
}

/// Launch into a pool owned by the caller.
#[async_trait]
impl ComponentLauncher for ProcessPool {
    async fn launch(&mut self, src: &str) -> anyhow::Result<Address> {
        Ok(ProcessPool::launch(self, Path::new(src))?)
    }
}

/// Launch through a running daemon.
#[async_trait]
impl ComponentLauncher for DaemonApi {
    async fn launch(&mut self, src: &str) -> anyhow::Result<Address> {
        Ok(self.process_start(src).await?)
    }
}
