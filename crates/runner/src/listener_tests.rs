// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

use super::*;
use crate::protocol::{read_response, write_request};
use bx_adapters::NoOpFlasher;
use bx_core::Job;

const JOB: &str = r#"
target:
  id: bench-03
deployment:
  start:
    kernel_url: http://lab/bzImage
    initramfs_url: http://lab/initrd
"#;

fn spawn_listener() -> (tempfile::TempDir, std::path::PathBuf, Arc<ExecutorHandle<NoOpFlasher>>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("control.sock");
    let job = Job::from_yaml(JOB).unwrap();
    let handle = ExecutorHandle::new(&job, NoOpFlasher::new());

    let socket = UnixListener::bind(&path).unwrap();
    tokio::spawn(Listener::new(socket, Arc::clone(&handle)).run());
    (dir, path, handle)
}

async fn roundtrip(path: &std::path::Path, request: Request) -> Response {
    let stream = UnixStream::connect(path).await.unwrap();
    let (mut reader, mut writer) = stream.into_split();
    write_request(&mut writer, &request, DEFAULT_TIMEOUT)
        .await
        .unwrap();
    read_response(&mut reader, DEFAULT_TIMEOUT).await.unwrap()
}

#[tokio::test]
async fn state_is_created_before_the_relay_exists() {
    let (_dir, path, _handle) = spawn_listener();

    let response = roundtrip(&path, Request::State).await;
    assert_eq!(
        response,
        Response::State {
            state: "CREATED".to_string()
        }
    );
}

#[tokio::test]
async fn cancel_sets_the_flag() {
    let (_dir, path, handle) = spawn_listener();

    let response = roundtrip(&path, Request::Cancel).await;
    assert_eq!(response, Response::Ok);
    assert!(handle.is_cancelled());
}

#[tokio::test]
async fn boot_config_serves_the_current_deployment() {
    let (_dir, path, _handle) = spawn_listener();

    let response = roundtrip(
        &path,
        Request::BootConfig {
            platform: "pxe".to_string(),
            buildarch: "x86_64".to_string(),
            bootloader: "uboot".to_string(),
        },
    )
    .await;
    let Response::BootConfig { config } = response else {
        panic!("unexpected response: {response:?}");
    };
    assert_eq!(config.kernel, "http://lab/bzImage");
    assert!(config.cmdline.contains("ip=dhcp"));
}

#[tokio::test]
async fn each_connection_serves_one_request() {
    let (_dir, path, handle) = spawn_listener();

    assert_eq!(
        roundtrip(&path, Request::State).await,
        Response::State {
            state: "CREATED".to_string()
        }
    );
    assert_eq!(roundtrip(&path, Request::Cancel).await, Response::Ok);
    assert!(handle.is_cancelled());
}
