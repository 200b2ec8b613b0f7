//! bxr startup failure specs
//!
//! Startup failures exit with the INCOMPLETE job status code (4) so the
//! caller sees them the same way as an aborted job.

use crate::prelude::*;

const INCOMPLETE: i32 = 4;

#[test]
fn missing_runner_config_exits_incomplete() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("control.sock");

    bxr()
        .args(&[
            "--config",
            "/nonexistent/runner.yaml",
            "--job",
            "/nonexistent/job.yaml",
            "--socket",
            socket.to_str().unwrap(),
        ])
        .exits(INCOMPLETE)
        .stderr_has("runner config");
}

#[test]
fn invalid_job_definition_exits_incomplete() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_runner_config(dir.path());
    let job = dir.path().join("job.yaml");
    std::fs::write(&job, "deployment: {}\n").unwrap();
    let socket = dir.path().join("control.sock");

    bxr()
        .args(&[
            "--config",
            config.to_str().unwrap(),
            "--job",
            job.to_str().unwrap(),
            "--socket",
            socket.to_str().unwrap(),
        ])
        .exits(INCOMPLETE)
        .stderr_has("job definition");
}

#[test]
fn job_with_retries_on_overall_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_runner_config(dir.path());
    let job = dir.path().join("job.yaml");
    std::fs::write(
        &job,
        concat!(
            "target:\n",
            "  id: bench-spec\n",
            "deployment:\n",
            "  start:\n",
            "    kernel_url: http://lab/bzImage\n",
            "    initramfs_url: http://lab/initrd\n",
            "timeouts:\n",
            "  overall:\n",
            "    hours: 1\n",
            "    retries: 2\n",
        ),
    )
    .unwrap();
    let socket = dir.path().join("control.sock");

    bxr()
        .args(&[
            "--config",
            config.to_str().unwrap(),
            "--job",
            job.to_str().unwrap(),
            "--socket",
            socket.to_str().unwrap(),
        ])
        .exits(INCOMPLETE)
        .stderr_has("overall timeout cannot have retries");
}
