// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

//! Runner configuration.
//!
//! Machine-side wiring (console address, PDU commands, cache paths)
//! lives in a YAML file; per-invocation paths come from CLI flags. Job
//! definitions are a separate document ([`bx_core::Job`]).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from runner configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Serial-console endpoint of the machine.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsoleConfig {
    /// `host:port` of the console server for this machine.
    pub addr: String,
}

/// PDU port wiring for the machine.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PduConfig {
    /// Command run (via `sh -c`) to switch the port on.
    pub on_cmd: String,
    /// Command run (via `sh -c`) to switch the port off.
    pub off_cmd: String,
    /// Minimum seconds the port stays off before switching back on.
    #[serde(default)]
    pub min_off_time_seconds: f64,
}

impl PduConfig {
    pub fn min_off_time(&self) -> Duration {
        Duration::from_secs_f64(self.min_off_time_seconds.max(0.0))
    }
}

/// Artifact cache served to the machine over the lab network.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Directory downloaded artifacts are written to.
    pub dir: PathBuf,
    /// Base URL under which `dir` is served to the machine.
    pub base_url: String,
}

/// Per-machine runner configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// Inventory id of the machine this runner drives.
    pub machine_id: String,
    pub console: ConsoleConfig,
    pub pdu: PduConfig,
    pub cache: CacheConfig,
    /// Inventory service base URL; unset disables unfit reports.
    pub inventory_url: Option<String>,
}

impl RunnerConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
