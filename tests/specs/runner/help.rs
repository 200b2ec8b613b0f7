//! bxr help output specs

use crate::prelude::*;

#[test]
fn bxr_help_shows_usage_and_flags() {
    bxr().args(&["--help"])
        .passes()
        .stdout_has("Usage:")
        .stdout_has("--config")
        .stdout_has("--job")
        .stdout_has("--socket");
}

#[test]
fn bxr_version_shows_version() {
    bxr().args(&["--version"]).passes().stdout_has("0.1");
}

#[test]
fn bxr_no_args_is_a_usage_error() {
    bxr().exits(2).stderr_has("--config");
}
