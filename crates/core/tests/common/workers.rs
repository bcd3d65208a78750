//! In-process workers and launchers for deterministic testing.

use async_trait::async_trait;
use crux_core::agent::ComponentLauncher;
use crux_core::component::{Execution, Worker};
use crux_core::transport::Address;
use crux_protocol::{Descriptor, PayloadMap};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A worker running on a background task.
#[allow(dead_code)]
pub struct TestWorker {
    pub address: Address,
    executions: Arc<AtomicUsize>,
    pub task: JoinHandle<()>,
}

impl TestWorker {
    /// How many `execute` requests this worker has accepted.
    #[allow(dead_code)]
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

/// Bind a worker at `address` and answer every execution with `behavior`.
///
/// `Err(message)` from the behavior becomes a failure reply. The task ends
/// when the worker is told to shut down.
#[allow(dead_code)]
pub async fn spawn_worker<F>(descriptor: Descriptor, address: Address, behavior: F) -> TestWorker
where
    F: Fn(&Execution) -> Result<PayloadMap, String> + Send + 'static,
{
    let mut worker = Worker::bind(descriptor, Some(address))
        .await
        .expect("Failed to bind worker");
    let address = worker.address().clone();
    let executions = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&executions);
    let task = tokio::spawn(async move {
        while let Ok(Some(execution)) = worker.wait().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = match behavior(&execution) {
                Ok(output) => worker.output(output),
                Err(message) => worker.fail(Some(message)),
            };
        }
    });

    TestWorker {
        address,
        executions,
        task,
    }
}

/// Echo the inputs back as the output.
#[allow(dead_code)]
pub fn echo(execution: &Execution) -> Result<PayloadMap, String> {
    Ok(execution.inputs.clone())
}

/// Resolves component sources to already-running workers.
#[derive(Default)]
#[allow(dead_code)]
pub struct StaticLauncher {
    addresses: HashMap<String, Address>,
    pub launched: Vec<String>,
}

impl StaticLauncher {
    #[allow(dead_code)]
    pub fn with(mut self, src: &str, address: Address) -> Self {
        self.addresses.insert(src.to_string(), address);
        self
    }
}

#[async_trait]
impl ComponentLauncher for StaticLauncher {
    async fn launch(&mut self, src: &str) -> anyhow::Result<Address> {
        self.launched.push(src.to_string());
        match self.addresses.get(src) {
            Some(address) => Ok(address.clone()),
            None => anyhow::bail!("unknown component source '{}'", src),
        }
    }
}
