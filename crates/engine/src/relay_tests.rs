// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

use super::*;
use bx_adapters::{FakeClient, FakeConsole, NoClient};
use bx_core::{ConsolePatterns, JobStatus, Timeouts};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn shared_timeouts() -> Arc<Mutex<Timeouts>> {
    Arc::new(Mutex::new(Timeouts::default()))
}

fn console_with(yaml: &str) -> ConsoleState {
    let patterns: ConsolePatterns = serde_yaml::from_str(yaml).unwrap();
    ConsoleState::new(patterns)
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met within 2s");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn connect_failure_goes_straight_to_over() {
    let (relay, task) = JobConsole::spawn(
        FakeConsole::failing(),
        None::<NoClient>,
        ConsoleState::default(),
        shared_timeouts(),
    );
    task.await.unwrap();
    assert_eq!(relay.state(), RelayState::Over);
}

#[tokio::test]
async fn backward_transition_is_rejected() {
    let (console, _peer) = FakeConsole::new();
    let (relay, task) = JobConsole::spawn(
        console,
        None::<NoClient>,
        ConsoleState::default(),
        shared_timeouts(),
    );
    wait_for(|| relay.state() >= RelayState::Active).await;

    let err = relay.set_state(RelayState::Created).unwrap_err();
    assert!(matches!(
        err,
        RelayError::BackwardTransition {
            from: RelayState::Active,
            to: RelayState::Created,
        }
    ));

    relay.close();
    task.await.unwrap();
}

#[tokio::test]
async fn session_end_line_moves_to_dut_done_then_over_without_client() {
    let (console, mut peer) = FakeConsole::new();
    let (relay, task) = JobConsole::spawn(
        console,
        None::<NoClient>,
        ConsoleState::default(),
        shared_timeouts(),
    );

    peer.write_all(b"[   12.345] reboot: Power Down\n")
        .await
        .unwrap();

    wait_for(|| relay.state() == RelayState::Over).await;
    assert!(relay.session_has_ended());
    assert_eq!(relay.job_status(), JobStatus::Complete);
    task.await.unwrap();
}

#[tokio::test]
async fn dut_eof_moves_to_dut_done() {
    let (console, peer) = FakeConsole::new();
    let (relay, task) = JobConsole::spawn(
        console,
        None::<NoClient>,
        ConsoleState::default(),
        shared_timeouts(),
    );
    wait_for(|| relay.state() >= RelayState::Active).await;

    drop(peer);
    // No client attached, so DUT_DONE auto-skips to OVER.
    wait_for(|| relay.state() == RelayState::Over).await;
    assert!(!relay.session_has_ended());
    task.await.unwrap();
}

#[tokio::test]
async fn machine_output_is_forwarded_to_the_client() {
    let (console, mut peer) = FakeConsole::new();
    let (client, _inbound_tx, seen) = FakeClient::new();
    let (relay, task) = JobConsole::spawn(
        console,
        Some(client),
        ConsoleState::default(),
        shared_timeouts(),
    );
    wait_for(|| relay.state() >= RelayState::Active).await;

    peer.write_all(b"[    1.000000] amdgpu: loaded\n")
        .await
        .unwrap();
    wait_for(|| !seen.lock().console.is_empty()).await;
    assert_eq!(seen.lock().console, b"[    1.000000] amdgpu: loaded\n");

    relay.close();
    task.await.unwrap();
}

#[tokio::test]
async fn client_input_is_forwarded_to_the_machine() {
    let (console, mut peer) = FakeConsole::new();
    let (client, inbound_tx, _seen) = FakeClient::new();
    let (relay, task) = JobConsole::spawn(
        console,
        Some(client),
        ConsoleState::default(),
        shared_timeouts(),
    );
    wait_for(|| relay.state() >= RelayState::Active).await;

    inbound_tx
        .send(bx_adapters::ClientInput::Console(b"login\n".to_vec()))
        .unwrap();

    let mut buf = [0u8; 6];
    peer.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"login\n");
    assert!(relay.last_activity_from_client().is_some());

    relay.close();
    task.await.unwrap();
}

#[tokio::test]
async fn log_lines_carry_relative_timestamps() {
    let (console, _peer) = FakeConsole::new();
    let (client, _inbound_tx, seen) = FakeClient::new();
    let (relay, task) = JobConsole::spawn(
        console,
        Some(client),
        ConsoleState::default(),
        shared_timeouts(),
    );
    wait_for(|| relay.state() >= RelayState::Active).await;

    relay.log("Powering up the machine");
    wait_for(|| !seen.lock().logs.is_empty()).await;
    let line = seen.lock().logs[0].clone();
    assert!(line.starts_with('+'), "missing relative prefix: {line}");
    assert!(line.ends_with("s: Powering up the machine"));

    relay.close();
    task.await.unwrap();
}

#[tokio::test]
async fn machine_activity_timestamp_waits_for_first_newline() {
    let (console, mut peer) = FakeConsole::new();
    let (relay, task) = JobConsole::spawn(
        console,
        None::<NoClient>,
        ConsoleState::default(),
        shared_timeouts(),
    );
    wait_for(|| relay.state() >= RelayState::Active).await;

    // Line noise before the first terminator is not "activity".
    peer.write_all(b"\xffU-Boot 2024.01 loading").await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(relay.last_activity_from_machine().is_none());

    peer.write_all(b"\n[    0.000000] Booting\n").await.unwrap();
    wait_for(|| relay.last_activity_from_machine().is_some()).await;

    relay.close();
    task.await.unwrap();
}

#[tokio::test]
async fn teardown_sends_handoff_and_half_closes() {
    let (console, mut peer) = FakeConsole::new();
    let (client, inbound_tx, seen) = FakeClient::new();
    let timeouts = shared_timeouts();
    let (relay, task) = JobConsole::spawn(
        console,
        Some(client),
        ConsoleState::default(),
        Arc::clone(&timeouts),
    );
    relay.set_bucket(Some(bx_adapters::BucketHandle {
        name: "job-7".to_string(),
        url: "http://bucket.local/job-7".to_string(),
        credentials: None,
    }));

    peer.write_all(b"[   12.345] reboot: Power Down\n")
        .await
        .unwrap();
    // Client is attached, so the relay parks in DUT_DONE.
    wait_for(|| relay.state() == RelayState::DutDone).await;

    relay.set_state(RelayState::TearDown).unwrap();
    wait_for(|| seen.lock().session_end.is_some()).await;
    {
        let seen = seen.lock();
        let (status, bucket) = seen.session_end.clone().unwrap();
        assert_eq!(status, JobStatus::Complete);
        assert_eq!(bucket.unwrap().name, "job-7");
        assert!(seen.write_shutdown);
    }

    // Client closing its side finishes the relay.
    drop(inbound_tx);
    wait_for(|| relay.state() == RelayState::Over).await;
    task.await.unwrap();
}

#[tokio::test]
async fn reboot_pattern_sets_needs_reboot_and_reset_clears_it() {
    let (console, mut peer) = FakeConsole::new();
    let (relay, task) = JobConsole::spawn(
        console,
        None::<NoClient>,
        console_with("session_reboot: 'rebooting now'"),
        shared_timeouts(),
    );
    wait_for(|| relay.state() >= RelayState::Active).await;

    peer.write_all(b"rebooting now\n").await.unwrap();
    wait_for(|| relay.needs_reboot()).await;
    assert!(!relay.session_has_ended());

    relay.reset_per_boot_state();
    assert!(!relay.needs_reboot());

    relay.close();
    task.await.unwrap();
}
