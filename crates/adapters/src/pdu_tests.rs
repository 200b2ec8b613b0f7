// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

use super::*;

#[tokio::test]
async fn command_pdu_runs_configured_commands() {
    let pdu = CommandPdu::new("true", "true", Duration::ZERO);
    pdu.set(PduState::Off).await.unwrap();
    pdu.set(PduState::On).await.unwrap();
}

#[tokio::test]
async fn command_pdu_surfaces_command_failure() {
    let pdu = CommandPdu::new("false", "true", Duration::ZERO);
    let err = pdu.set(PduState::On).await.unwrap_err();
    assert!(matches!(err, PduError::CommandFailed(_)));
}

#[tokio::test]
async fn command_pdu_enforces_min_off_time_before_on() {
    let pdu = CommandPdu::new("true", "true", Duration::from_millis(80));
    pdu.set(PduState::Off).await.unwrap();

    let before = Instant::now();
    pdu.set(PduState::On).await.unwrap();
    assert!(before.elapsed() >= Duration::from_millis(70));
}

#[tokio::test]
async fn fake_pdu_counts_power_cycles() {
    let pdu = FakePdu::new();
    pdu.set(PduState::Off).await.unwrap();
    pdu.set(PduState::On).await.unwrap();
    pdu.set(PduState::Off).await.unwrap();
    pdu.set(PduState::On).await.unwrap();
    pdu.set(PduState::Off).await.unwrap();

    assert_eq!(pdu.power_cycles(), 2);
    assert_eq!(pdu.current_state(), Some(PduState::Off));
}
