//! bx error handling specs

use crate::prelude::*;

#[test]
fn bx_state_against_missing_socket_fails() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("missing.sock");

    bx().args(&["--socket", socket.to_str().unwrap(), "state"])
        .exits(1)
        .stderr_has("Error:")
        .stderr_has("connecting to");
}

#[test]
fn bx_boot_config_requires_all_flags() {
    bx().args(&[
        "--socket",
        "/tmp/x.sock",
        "boot-config",
        "--platform",
        "pxe",
    ])
    .exits(2)
    .stderr_has("--buildarch");
}

#[test]
fn bx_rejects_unknown_subcommands() {
    bx().args(&["--socket", "/tmp/x.sock", "reboot"])
        .exits(2)
        .stderr_has("Usage:");
}
