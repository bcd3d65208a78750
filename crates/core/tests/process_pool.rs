//! Integration tests for the process pool against real OS processes.

#![cfg(unix)]

mod common;

use common::fixtures::*;
use crux_core::pool::{ProcessLoadError, ProcessPool};
use crux_protocol::TransportKind;
use std::time::Duration;

/// Poll until the pool reports no live processes.
async fn wait_until_empty(pool: &mut ProcessPool) {
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while !pool.get_all_addrs().is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Processes still alive: {:?}",
            pool
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_launch_missing_descriptor() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut pool = ProcessPool::new(TransportKind::Tcp);

    let result = pool.launch(&dir.path().join("does-not-exist"));

    assert!(matches!(result, Err(ProcessLoadError::DescriptorMissing(_))));
    assert!(pool.get_all_addrs().is_empty());
}

#[tokio::test]
async fn test_launch_missing_startup() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let component = write_component(dir.path(), "nostart", None);
    let mut pool = ProcessPool::new(TransportKind::Tcp);

    let result = pool.launch(&component);

    assert!(matches!(result, Err(ProcessLoadError::MissingStartup(_))));
    assert!(pool.is_empty());
}

#[tokio::test]
async fn test_terminate_all_empties_pool() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let component = write_component(dir.path(), "sleeper", Some("sleep 30"));
    let mut pool = ProcessPool::new(TransportKind::Ipc).with_ipc_dir(dir.path().join("ipc"));

    let first = pool.launch(&component).expect("Failed to launch");
    let second = pool.launch(&component).expect("Failed to launch");
    assert_ne!(first, second);

    let addrs = pool.get_all_addrs();
    assert_eq!(addrs.len(), 2);
    assert!(addrs.contains(&first) && addrs.contains(&second));

    pool.terminate_all();
    wait_until_empty(&mut pool).await;
}

#[tokio::test]
async fn test_kill_all_and_wait_all() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let component = write_component(dir.path(), "sleeper", Some("sleep 30"));
    let mut pool = ProcessPool::new(TransportKind::Tcp);

    pool.launch(&component).expect("Failed to launch");
    pool.kill_all();

    tokio::time::timeout(TEST_TIMEOUT, pool.wait_all())
        .await
        .expect("Processes did not exit");
    assert!(pool.is_empty());
}

#[tokio::test]
async fn test_exited_processes_are_swept() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let component = write_component(dir.path(), "quick", Some("true"));
    let mut pool = ProcessPool::new(TransportKind::Tcp);

    pool.launch(&component).expect("Failed to launch");
    wait_until_empty(&mut pool).await;

    // Signalling an empty pool is a no-op.
    pool.terminate_all();
    pool.kill_all();
}

#[tokio::test]
async fn test_child_sees_bind_address_and_working_dir() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let component = write_component(
        dir.path(),
        "reporter",
        Some("printf '%s' \"$CRUX_BIND\" > bind.txt"),
    );
    let mut pool = ProcessPool::new(TransportKind::Tcp);

    let address = pool.launch(&component).expect("Failed to launch");
    wait_until_empty(&mut pool).await;

    let bind = std::fs::read_to_string(component.join("bind.txt")).expect("bind.txt missing");
    let port = address.port().expect("tcp address");
    assert_eq!(bind, format!("tcp://*:{}", port));
}
