//! Shutdown acknowledgements must reach the requester even when the serving
//! side's runtime is torn down the moment its loop returns.

#![cfg(unix)]

mod common;

use common::fixtures::*;
use crux_core::component::{ComponentHandle, Worker};
use crux_core::daemon::{Daemon, DaemonApi};
use crux_core::pool::ProcessPool;
use crux_core::transport::ChannelOptions;
use crux_protocol::{names, TransportKind};
use std::future::Future;
use std::thread::JoinHandle;

const ROUNDS: usize = 25;

/// Run `serve` on a dedicated multi-thread runtime that is dropped as soon as
/// `serve` completes, the way a component's `main` returns.
fn serve_on_own_runtime<F, Fut>(serve: F) -> JoinHandle<()>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()>,
{
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("Failed to build runtime");
        runtime.block_on(serve());
        drop(runtime);
    })
}

async fn join(server: JoinHandle<()>) {
    tokio::task::spawn_blocking(move || server.join())
        .await
        .expect("Join task panicked")
        .expect("Serving thread panicked");
}

fn options() -> ChannelOptions {
    ChannelOptions::default().with_request_timeout(TEST_TIMEOUT)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_worker_acknowledges_shutdown_before_exiting() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    for round in 0..ROUNDS {
        let address = ipc_address(dir.path(), &format!("worker-{}", round));
        let bind = address.clone();
        let server = serve_on_own_runtime(move || async move {
            let mut worker = Worker::bind(descriptor("w", "1.0.0", &[], &[]), Some(bind))
                .await
                .expect("Failed to bind worker");
            assert!(worker.wait().await.expect("wait failed").is_none());
        });

        let mut handle = ComponentHandle::connect(address, options())
            .await
            .expect("Failed to connect");
        let reply = handle
            .shutdown()
            .await
            .unwrap_or_else(|e| panic!("round {}: shutdown lost: {}", round, e));
        assert_eq!(reply.name, names::ACK);

        join(server).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_daemon_acknowledges_shutdown_before_exiting() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    for round in 0..ROUNDS {
        let address = ipc_address(dir.path(), &format!("daemon-{}", round));
        let bind = address.clone();
        let ipc_dir = dir.path().join("ipc");
        let server = serve_on_own_runtime(move || async move {
            let pool = ProcessPool::new(TransportKind::Ipc).with_ipc_dir(ipc_dir);
            let daemon = Daemon::bind(&bind, None, pool)
                .await
                .expect("Failed to bind daemon");
            daemon.listen().await.expect("Daemon returned an error");
        });

        let mut api = DaemonApi::new(address, options());
        api.shutdown()
            .await
            .unwrap_or_else(|e| panic!("round {}: shutdown lost: {}", round, e));

        join(server).await;
    }
}
