// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

//! Final job status and its process-exit-code mapping.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a job, reported to the invoking harness as the process
/// exit code of the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Unknown,
    /// Session ended, success pattern matched, no warning pattern.
    Pass,
    /// Session ended, success and warning patterns both matched.
    Warn,
    /// Session ended, a success pattern was configured but never matched.
    Fail,
    /// Session never ended (timeout exhaustion, cancellation, crash).
    Incomplete,
    /// Session ended and no success pattern was configured.
    Complete,
}

impl JobStatus {
    /// Numeric value used as the runner's process exit code.
    pub fn exit_code(self) -> i32 {
        match self {
            JobStatus::Unknown => 0,
            JobStatus::Pass => 1,
            JobStatus::Warn => 2,
            JobStatus::Fail => 3,
            JobStatus::Incomplete => 4,
            JobStatus::Complete => 5,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Unknown => "UNKNOWN",
            JobStatus::Pass => "PASS",
            JobStatus::Warn => "WARN",
            JobStatus::Fail => "FAIL",
            JobStatus::Incomplete => "INCOMPLETE",
            JobStatus::Complete => "COMPLETE",
        };
        write!(f, "{}", s)
    }
}
