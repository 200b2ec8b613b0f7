//! bx help output specs

use crate::prelude::*;

#[test]
fn bx_help_shows_usage_and_subcommands() {
    bx().args(&["--help"])
        .passes()
        .stdout_has("Usage:")
        .stdout_has("state")
        .stdout_has("cancel")
        .stdout_has("boot-config");
}

#[test]
fn bx_version_shows_version() {
    bx().args(&["--version"]).passes().stdout_has("0.1");
}

#[test]
fn bx_no_args_is_a_usage_error() {
    bx().exits(2).stderr_has("Usage:");
}

#[test]
fn bx_boot_config_help_shows_flags() {
    bx().args(&["--socket", "/tmp/x.sock", "boot-config", "--help"])
        .passes()
        .stdout_has("--platform")
        .stdout_has("--buildarch")
        .stdout_has("--bootloader");
}
