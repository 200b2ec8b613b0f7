// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

//! Console-line classification: patterns, watchdogs, and the per-job
//! accumulator that decides reboot/end/status.
//!
//! Patterns use byte regexes in search mode (a match anywhere in the
//! line counts). The accumulator is a fixed set of typed flags rather
//! than a string-keyed set, so a misspelled event name is a compile
//! error here instead of a silently-dead check.

use crate::job::ConfigError;
use crate::status::JobStatus;
use crate::timeout::{Timeout, Timeouts};
use regex::bytes::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

/// Pattern matched when the DUT announces a clean shutdown. The printk
/// timestamp width varies with the configured precision.
pub const DEFAULT_SESSION_END: &str = r"^\[[\d \.]{9,12}\] reboot: Power Down$";

/// A compiled byte-regex, deserialized from its string form.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(source).map_err(|e| ConfigError::InvalidPattern {
            pattern: source.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, line: &[u8]) -> bool {
        self.regex.is_match(line)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let source = String::deserialize(deserializer)?;
        Pattern::new(&source).map_err(serde::de::Error::custom)
    }
}

/// Event a watchdog reported for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogEvent {
    Start,
    Reset,
    Stop,
}

impl WatchdogEvent {
    pub fn label(self) -> &'static str {
        match self {
            WatchdogEvent::Start => "start",
            WatchdogEvent::Reset => "reset",
            WatchdogEvent::Stop => "stop",
        }
    }
}

/// Start/reset/stop pattern triple driving one timeout slot.
///
/// The watchdog itself is stateless: whether it is "armed" is entirely
/// the `is_started` state of the timeout it is bound to. A watchdog
/// whose name has no timeout slot is inert.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Watchdog {
    pub start: Pattern,
    pub reset: Pattern,
    pub stop: Pattern,
}

impl Watchdog {
    /// Classify one line against the bound timeout.
    pub fn process_line(
        &self,
        line: &[u8],
        timeout: &mut Timeout,
        now: Instant,
    ) -> Option<WatchdogEvent> {
        if !timeout.is_started() {
            if self.start.is_match(line) {
                timeout.start(now);
                return Some(WatchdogEvent::Start);
            }
        } else if self.reset.is_match(line) {
            timeout.reset(now);
            return Some(WatchdogEvent::Reset);
        } else if self.stop.is_match(line) {
            timeout.stop();
            return Some(WatchdogEvent::Stop);
        }
        None
    }

    /// Force-stop the bound timeout, whatever state it is in.
    pub fn cancel(&self, timeout: &mut Timeout) {
        timeout.stop();
    }
}

/// YAML shape of the `console_patterns:` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsolePatterns {
    #[serde(default = "default_session_end")]
    pub session_end: Pattern,
    pub session_reboot: Option<Pattern>,
    pub job_success: Option<Pattern>,
    pub job_warn: Option<Pattern>,
    pub machine_unfit_for_service: Option<Pattern>,
    #[serde(default)]
    pub watchdogs: HashMap<String, Watchdog>,
}

fn default_session_end() -> Pattern {
    // Known-valid constant, covered by a test.
    #[allow(clippy::unwrap_used)]
    Pattern::new(DEFAULT_SESSION_END).unwrap()
}

impl Default for ConsolePatterns {
    fn default() -> Self {
        Self {
            session_end: default_session_end(),
            session_reboot: None,
            job_success: None,
            job_warn: None,
            machine_unfit_for_service: None,
            watchdogs: HashMap::new(),
        }
    }
}

/// Flags accumulated over one job. Only `session_reboot` is cleared
/// between boot cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Matched {
    pub session_end: bool,
    pub session_reboot: bool,
    pub job_success: bool,
    pub job_warn: bool,
    pub machine_unfit_for_service: bool,
}

/// The per-job console classifier.
#[derive(Debug, Clone, Default)]
pub struct ConsoleState {
    patterns: ConsolePatterns,
    matched: Matched,
}

impl ConsoleState {
    pub fn new(patterns: ConsolePatterns) -> Self {
        Self {
            patterns,
            matched: Matched::default(),
        }
    }

    pub fn patterns(&self) -> &ConsolePatterns {
        &self.patterns
    }

    pub fn matched(&self) -> Matched {
        self.matched
    }

    /// Classify one console line.
    ///
    /// Trailing `\r`/`\n` are stripped before matching so `$`-anchored
    /// patterns behave as line anchors. Returns the labels matched by
    /// THIS call (watchdog events namespaced `"<name>.<event>"`) for
    /// logging; the accumulated flags persist across calls.
    pub fn process_line(
        &mut self,
        line: &[u8],
        timeouts: &mut Timeouts,
        now: Instant,
    ) -> Vec<String> {
        let line = trim_line_ending(line);
        let mut labels = Vec::new();

        if self.patterns.session_end.is_match(line) {
            self.matched.session_end = true;
            labels.push("session_end".to_string());
        }
        if matches_opt(&self.patterns.session_reboot, line) {
            self.matched.session_reboot = true;
            labels.push("session_reboot".to_string());
        }
        if matches_opt(&self.patterns.job_success, line) {
            self.matched.job_success = true;
            labels.push("job_success".to_string());
        }
        if matches_opt(&self.patterns.job_warn, line) {
            self.matched.job_warn = true;
            labels.push("job_warn".to_string());
        }
        if matches_opt(&self.patterns.machine_unfit_for_service, line) {
            self.matched.machine_unfit_for_service = true;
            labels.push("machine_unfit_for_service".to_string());
        }

        for (name, watchdog) in &self.patterns.watchdogs {
            // No timeout slot under this name means the watchdog is not armed.
            let Some(timeout) = timeouts.watchdogs.get_mut(name) else {
                continue;
            };
            if let Some(event) = watchdog.process_line(line, timeout, now) {
                labels.push(format!("{}.{}", name, event.label()));
            }
        }

        labels
    }

    /// Stop every watchdog-bound timeout. Used when a boot cycle is
    /// aborted so stale watchdog windows cannot expire the next one.
    pub fn cancel_watchdogs(&self, timeouts: &mut Timeouts) {
        for (name, watchdog) in &self.patterns.watchdogs {
            if let Some(timeout) = timeouts.watchdogs.get_mut(name) {
                watchdog.cancel(timeout);
            }
        }
    }

    /// Discard the reboot request before a new boot cycle. End, status
    /// and unfit flags survive: a reboot mid-job may be needed before
    /// `session_end` can be observed at all.
    pub fn reset_per_boot_state(&mut self) {
        self.matched.session_reboot = false;
    }

    /// An unfit machine ends the session: there is no point powering it
    /// back on.
    pub fn session_has_ended(&self) -> bool {
        self.matched.session_end || self.matched.machine_unfit_for_service
    }

    pub fn needs_reboot(&self) -> bool {
        self.matched.session_reboot
    }

    pub fn machine_is_unfit_for_service(&self) -> bool {
        self.matched.machine_unfit_for_service
    }

    /// Final status, keyed on whether `session_end` itself was seen.
    pub fn job_status(&self) -> JobStatus {
        if !self.matched.session_end {
            return JobStatus::Incomplete;
        }
        if self.patterns.job_success.is_none() {
            return JobStatus::Complete;
        }
        match (self.matched.job_success, self.matched.job_warn) {
            (true, false) => JobStatus::Pass,
            (true, true) => JobStatus::Warn,
            (false, _) => JobStatus::Fail,
        }
    }
}

fn matches_opt(pattern: &Option<Pattern>, line: &[u8]) -> bool {
    pattern.as_ref().is_some_and(|p| p.is_match(line))
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

#[cfg(test)]
#[path = "console_tests.rs"]
mod tests;
