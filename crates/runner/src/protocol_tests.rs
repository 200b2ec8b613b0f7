// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

use super::*;
use bx_core::BootConfig;

#[test]
fn request_round_trips() {
    let requests = vec![
        Request::State,
        Request::BootConfig {
            platform: "pxe".to_string(),
            buildarch: "arm64".to_string(),
            bootloader: "uboot".to_string(),
        },
        Request::Cancel,
    ];
    for request in requests {
        let bytes = encode(&request).unwrap();
        let decoded: Request = decode(&bytes).unwrap();
        assert_eq!(decoded, request);
    }
}

#[test]
fn response_round_trips() {
    let responses = vec![
        Response::State {
            state: "ACTIVE".to_string(),
        },
        Response::BootConfig {
            config: BootConfig {
                kernel: "http://cache/bzImage".to_string(),
                initrd: "http://cache/initrd".to_string(),
                dtb: None,
                cmdline: "console=ttyS0,115200 earlycon".to_string(),
            },
        },
        Response::Ok,
        Response::Error {
            message: "no such job".to_string(),
        },
    ];
    for response in responses {
        let bytes = encode(&response).unwrap();
        let decoded: Response = decode(&bytes).unwrap();
        assert_eq!(decoded, response);
    }
}

#[test]
fn request_has_a_type_tag() {
    let bytes = encode(&Request::Cancel).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["type"], "Cancel");
}

#[tokio::test]
async fn message_framing_round_trips() {
    let (mut a, mut b) = tokio::io::duplex(4096);

    let bytes = encode(&Request::State).unwrap();
    write_message(&mut a, &bytes).await.unwrap();

    let read = read_message(&mut b).await.unwrap();
    assert_eq!(read, bytes);
    let decoded: Request = decode(&read).unwrap();
    assert_eq!(decoded, Request::State);
}

#[tokio::test]
async fn closed_connection_is_reported() {
    let (a, mut b) = tokio::io::duplex(4096);
    drop(a);

    let err = read_message(&mut b).await.unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
}

#[tokio::test]
async fn oversized_length_prefix_is_rejected() {
    use tokio::io::AsyncWriteExt;

    let (mut a, mut b) = tokio::io::duplex(4096);
    let len = (MAX_MESSAGE_SIZE as u32 + 1).to_be_bytes();
    a.write_all(&len).await.unwrap();

    let err = read_message(&mut b).await.unwrap_err();
    assert!(matches!(err, ProtocolError::MessageTooLarge { .. }));
}

#[tokio::test]
async fn read_request_times_out_on_silence() {
    let (_a, mut b) = tokio::io::duplex(4096);

    let err = read_request(&mut b, std::time::Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Timeout));
}
