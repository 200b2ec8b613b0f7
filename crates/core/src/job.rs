// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

//! Job definition: target, deployments, timeouts, console patterns.
//!
//! A job is parsed once from YAML and is read-only afterwards. All
//! validation (regex compilation, retry invariants, target shape)
//! happens here, before any hardware side effect.

use crate::console::{ConsolePatterns, ConsoleState};
use crate::timeout::{Timeouts, TimeoutsSpec};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Errors from job/runner configuration parsing and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("{name} timeout cannot have retries")]
    RetriesNotAllowed { name: String },

    #[error("target needs an id or at least one tag")]
    MissingTarget,
}

/// Boot artifacts for one boot of the DUT.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentState {
    pub kernel_url: String,
    #[serde(default)]
    pub kernel_cmdline: String,
    pub initramfs_url: String,
    pub dtb_url: Option<String>,
}

impl DeploymentState {
    /// Every artifact URL this deployment references.
    pub fn artifact_urls(&self) -> Vec<&str> {
        let mut urls = vec![self.kernel_url.as_str(), self.initramfs_url.as_str()];
        if let Some(dtb) = &self.dtb_url {
            urls.push(dtb.as_str());
        }
        urls
    }
}

/// Sparse overlay for the continue deployment: any unset field falls
/// back to the start deployment's value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeploymentOverlay {
    kernel_url: Option<String>,
    kernel_cmdline: Option<String>,
    initramfs_url: Option<String>,
    dtb_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeploymentSpec {
    start: DeploymentState,
    #[serde(rename = "continue", default)]
    continue_overlay: Option<DeploymentOverlay>,
}

/// Start deployment for the first boot cycle, continue deployment for
/// every cycle after the first successful one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub start: DeploymentState,
    pub continues: DeploymentState,
}

impl Deployment {
    fn from_spec(spec: DeploymentSpec) -> Self {
        let overlay = spec.continue_overlay.unwrap_or_default();
        let continues = DeploymentState {
            kernel_url: overlay.kernel_url.unwrap_or_else(|| spec.start.kernel_url.clone()),
            kernel_cmdline: overlay
                .kernel_cmdline
                .unwrap_or_else(|| spec.start.kernel_cmdline.clone()),
            initramfs_url: overlay
                .initramfs_url
                .unwrap_or_else(|| spec.start.initramfs_url.clone()),
            dtb_url: overlay.dtb_url.or_else(|| spec.start.dtb_url.clone()),
        };
        Self {
            start: spec.start,
            continues,
        }
    }
}

/// Which machine the job wants, by id or by tag set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    pub id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Target {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_none() && self.tags.is_empty() {
            return Err(ConfigError::MissingTarget);
        }
        Ok(())
    }
}

/// Boot configuration served to the DUT's network-boot request.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, Deserialize)]
pub struct BootConfig {
    pub kernel: String,
    pub initrd: String,
    pub dtb: Option<String>,
    pub cmdline: String,
}

impl BootConfig {
    pub fn from_deployment(d: &DeploymentState) -> Self {
        Self {
            kernel: d.kernel_url.clone(),
            initrd: d.initramfs_url.clone(),
            dtb: d.dtb_url.clone(),
            cmdline: d.kernel_cmdline.clone(),
        }
    }

    /// Fill fields the job left empty with per-platform defaults.
    pub fn fixup_missing_fields_with_defaults(&mut self, platform: &str, buildarch: &str) {
        if self.cmdline.is_empty() {
            self.cmdline = match buildarch {
                "arm32" | "arm64" => "console=ttyAMA0,115200 earlycon".to_string(),
                _ => "console=ttyS0,115200 earlycon".to_string(),
            };
        }
        if !self.cmdline.contains("ip=") && platform.starts_with("pxe") {
            self.cmdline.push_str(" ip=dhcp");
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct JobSpec {
    #[serde(default = "default_version")]
    version: u32,
    target: Target,
    deployment: DeploymentSpec,
    #[serde(default)]
    timeouts: TimeoutsSpec,
    #[serde(default)]
    console_patterns: ConsolePatterns,
    /// Absolute deadline as a unix timestamp (seconds).
    deadline: Option<u64>,
}

fn default_version() -> u32 {
    1
}

/// A parsed, validated job definition.
#[derive(Debug, Clone)]
pub struct Job {
    pub version: u32,
    pub target: Target,
    pub deployment: Deployment,
    pub timeouts: Timeouts,
    pub console_patterns: ConsolePatterns,
    pub deadline: Option<u64>,
}

impl Job {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let spec: JobSpec = serde_yaml::from_str(yaml)?;
        spec.target.validate()?;
        let timeouts = Timeouts::from_spec(&spec.timeouts)?;
        Ok(Self {
            version: spec.version,
            target: spec.target,
            deployment: Deployment::from_spec(spec.deployment),
            timeouts,
            console_patterns: spec.console_patterns,
            deadline: spec.deadline,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Fresh console classifier for this job's patterns.
    pub fn console_state(&self) -> ConsoleState {
        ConsoleState::new(self.console_patterns.clone())
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
