// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

use super::*;
use std::time::Duration;

const FULL: &str = r#"
machine_id: bench-03
console:
  addr: console.lab:5003
pdu:
  on_cmd: "pductl 3 on"
  off_cmd: "pductl 3 off"
  min_off_time_seconds: 1.5
cache:
  dir: /var/cache/bx
  base_url: http://10.0.0.1:8100/cache
inventory_url: http://inventory.lab:8000
"#;

#[test]
fn full_config_parses() {
    let config = RunnerConfig::from_yaml(FULL).unwrap();
    assert_eq!(config.machine_id, "bench-03");
    assert_eq!(config.console.addr, "console.lab:5003");
    assert_eq!(config.pdu.min_off_time(), Duration::from_millis(1500));
    assert_eq!(config.cache.base_url, "http://10.0.0.1:8100/cache");
    assert_eq!(
        config.inventory_url.as_deref(),
        Some("http://inventory.lab:8000")
    );
}

const MINIMAL: &str = r#"
machine_id: bench-03
console:
  addr: console.lab:5003
pdu:
  on_cmd: "true"
  off_cmd: "true"
cache:
  dir: /var/cache/bx
  base_url: http://10.0.0.1:8100/cache
"#;

#[test]
fn minimal_config_defaults() {
    let config = RunnerConfig::from_yaml(MINIMAL).unwrap();
    assert_eq!(config.pdu.min_off_time(), Duration::ZERO);
    assert!(config.inventory_url.is_none());
}

#[test]
fn unknown_fields_are_rejected() {
    let yaml = format!("{MINIMAL}\nserial_speed: 115200\n");
    assert!(matches!(
        RunnerConfig::from_yaml(&yaml),
        Err(ConfigError::Yaml(_))
    ));
}

#[test]
fn from_file_reads_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runner.yaml");
    std::fs::write(&path, FULL).unwrap();

    let config = RunnerConfig::from_file(&path).unwrap();
    assert_eq!(config.machine_id, "bench-03");
}

#[test]
fn missing_file_is_an_io_error() {
    let err = RunnerConfig::from_file(std::path::Path::new("/nonexistent/runner.yaml"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}
