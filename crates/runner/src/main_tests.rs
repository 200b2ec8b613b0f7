// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

use super::*;

#[test]
fn job_id_defaults_to_the_file_stem() {
    assert_eq!(job_id_from(Path::new("/srv/jobs/kernel-boot.yaml")), "kernel-boot");
    assert_eq!(job_id_from(Path::new("job.yaml")), "job");
}

#[test]
fn lock_is_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runner.pid");

    let first = acquire_lock(&path).unwrap();
    let err = acquire_lock(&path).unwrap_err();
    assert!(matches!(err, StartupError::Locked { .. }));

    drop(first);
    acquire_lock(&path).unwrap();
}

#[test]
fn lock_file_records_the_pid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runner.pid");

    let _lock = acquire_lock(&path).unwrap();
    let recorded = std::fs::read_to_string(&path).unwrap();
    assert_eq!(recorded.trim(), std::process::id().to_string());
}

#[test]
fn args_require_the_core_flags() {
    let err = Args::try_parse_from(["bxr"]).unwrap_err();
    assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

    let args = Args::try_parse_from([
        "bxr",
        "--config",
        "/etc/bx/runner.yaml",
        "--job",
        "/srv/jobs/kernel-boot.yaml",
        "--socket",
        "/run/bx/control.sock",
    ])
    .unwrap();
    assert_eq!(args.client_version, 1);
    assert!(args.lock.is_none());
}
