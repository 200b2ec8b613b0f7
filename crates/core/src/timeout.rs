// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

//! Named countdowns with retry budgets, and the per-job aggregate.
//!
//! A [`Timeout`] is a window measured from an explicit `start()` (or
//! `reset()`) instant. It does not schedule anything: the executor polls
//! `has_expired(now)` on its own cadence. [`Timeouts`] owns the fixed
//! per-job slots plus any watchdog-bound timeouts, and enforces the
//! configuration invariants at construction time.

use crate::job::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default window for the `overall` slot.
pub const DEFAULT_OVERALL: Duration = Duration::from_secs(6 * 3600);

/// Default window for the `infra_teardown` slot.
pub const DEFAULT_INFRA_TEARDOWN: Duration = Duration::from_secs(10 * 60);

/// A single named countdown with a retry budget.
///
/// `duration == None` means the timeout never expires. Stopping clears
/// the window but preserves `retried`; the budget spans the whole job,
/// not one boot cycle.
#[derive(Debug, Clone)]
pub struct Timeout {
    name: String,
    duration: Option<Duration>,
    retries: u32,
    started_at: Option<Instant>,
    retried: u32,
}

impl Timeout {
    pub fn new(name: impl Into<String>, duration: Option<Duration>, retries: u32) -> Self {
        Self {
            name: name.into(),
            duration,
            retries,
            started_at: None,
            retried: 0,
        }
    }

    pub fn from_spec(name: impl Into<String>, spec: &TimeoutSpec) -> Self {
        Self::new(name, spec.duration(), spec.retries)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn retried(&self) -> u32 {
        self.retried
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Start (or restart) the window at `now`. Calling this on a running
    /// timeout resets the window, same as [`Timeout::reset`].
    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
    }

    /// Move the window start to `when`. Used to extend a running timeout
    /// from observed activity rather than wall time.
    pub fn reset(&mut self, when: Instant) {
        self.started_at = Some(when);
    }

    /// Clear the window. `retried` is unchanged.
    pub fn stop(&mut self) {
        self.started_at = None;
    }

    /// Stop the window and consume one retry. Returns false once the
    /// budget is exhausted; the caller must treat that as terminal.
    pub fn retry(&mut self) -> bool {
        self.stop();
        self.retried += 1;
        self.retried <= self.retries
    }

    /// How long the window has been running, if it is running.
    pub fn active_for(&self, now: Instant) -> Option<Duration> {
        self.started_at.map(|s| now.saturating_duration_since(s))
    }

    /// True iff the window is running and strictly more than `duration`
    /// has elapsed. A timeout with no duration never expires.
    pub fn has_expired(&self, now: Instant) -> bool {
        match (self.started_at, self.duration) {
            (Some(started), Some(duration)) => now.saturating_duration_since(started) > duration,
            _ => false,
        }
    }
}

/// YAML shape of one timeout: independently-optional duration fields
/// plus a retry count. All duration fields unset means "never expires".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutSpec {
    pub days: Option<f64>,
    pub hours: Option<f64>,
    pub minutes: Option<f64>,
    pub seconds: Option<f64>,
    pub milliseconds: Option<f64>,
    #[serde(default)]
    pub retries: u32,
}

impl TimeoutSpec {
    pub fn duration(&self) -> Option<Duration> {
        if self.days.is_none()
            && self.hours.is_none()
            && self.minutes.is_none()
            && self.seconds.is_none()
            && self.milliseconds.is_none()
        {
            return None;
        }
        let secs = self.days.unwrap_or(0.0) * 86_400.0
            + self.hours.unwrap_or(0.0) * 3_600.0
            + self.minutes.unwrap_or(0.0) * 60.0
            + self.seconds.unwrap_or(0.0)
            + self.milliseconds.unwrap_or(0.0) / 1_000.0;
        Some(Duration::from_secs_f64(secs.max(0.0)))
    }
}

/// YAML shape of the whole `timeouts:` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutsSpec {
    pub overall: Option<TimeoutSpec>,
    pub infra_setup: Option<TimeoutSpec>,
    pub infra_teardown: Option<TimeoutSpec>,
    pub boot_cycle: Option<TimeoutSpec>,
    pub console_activity: Option<TimeoutSpec>,
    pub first_console_activity: Option<TimeoutSpec>,
    #[serde(default)]
    pub watchdogs: HashMap<String, TimeoutSpec>,
}

/// The per-job timeout aggregate: six fixed slots plus one timeout per
/// named watchdog.
#[derive(Debug, Clone)]
pub struct Timeouts {
    pub overall: Timeout,
    pub infra_setup: Timeout,
    pub infra_teardown: Timeout,
    pub boot_cycle: Timeout,
    pub console_activity: Timeout,
    pub first_console_activity: Timeout,
    pub watchdogs: HashMap<String, Timeout>,
}

impl Timeouts {
    /// Build from parsed YAML, filling defaults for unset slots and
    /// validating the no-retry invariants.
    pub fn from_spec(spec: &TimeoutsSpec) -> Result<Self, ConfigError> {
        let slot = |name: &str, s: &Option<TimeoutSpec>, default: Option<Duration>| match s {
            Some(s) => Timeout::from_spec(name, s),
            None => Timeout::new(name, default, 0),
        };

        let timeouts = Self {
            overall: slot("overall", &spec.overall, Some(DEFAULT_OVERALL)),
            infra_setup: slot("infra_setup", &spec.infra_setup, None),
            infra_teardown: slot(
                "infra_teardown",
                &spec.infra_teardown,
                Some(DEFAULT_INFRA_TEARDOWN),
            ),
            boot_cycle: slot("boot_cycle", &spec.boot_cycle, None),
            console_activity: slot("console_activity", &spec.console_activity, None),
            first_console_activity: slot(
                "first_console_activity",
                &spec.first_console_activity,
                None,
            ),
            watchdogs: spec
                .watchdogs
                .iter()
                .map(|(name, s)| (name.clone(), Timeout::from_spec(name.clone(), s)))
                .collect(),
        };
        timeouts.validate()?;
        Ok(timeouts)
    }

    /// Reject retry budgets on the slots whose expiry must be terminal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for t in [&self.overall, &self.infra_teardown] {
            if t.retries() != 0 {
                return Err(ConfigError::RetriesNotAllowed {
                    name: t.name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// All timeouts, fixed slots first, then watchdogs.
    pub fn iter(&self) -> impl Iterator<Item = &Timeout> {
        [
            &self.overall,
            &self.infra_setup,
            &self.infra_teardown,
            &self.boot_cycle,
            &self.console_activity,
            &self.first_console_activity,
        ]
        .into_iter()
        .chain(self.watchdogs.values())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Timeout> {
        [
            &mut self.overall,
            &mut self.infra_setup,
            &mut self.infra_teardown,
            &mut self.boot_cycle,
            &mut self.console_activity,
            &mut self.first_console_activity,
        ]
        .into_iter()
        .chain(self.watchdogs.values_mut())
    }

    pub fn has_expired(&self, now: Instant) -> bool {
        self.iter().any(|t| t.has_expired(now))
    }

    /// Names of every currently-expired timeout.
    pub fn expired_names(&self, now: Instant) -> Vec<String> {
        self.iter()
            .filter(|t| t.has_expired(now))
            .map(|t| t.name().to_string())
            .collect()
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        // Spec defaults cannot violate the retry invariants.
        Self {
            overall: Timeout::new("overall", Some(DEFAULT_OVERALL), 0),
            infra_setup: Timeout::new("infra_setup", None, 0),
            infra_teardown: Timeout::new("infra_teardown", Some(DEFAULT_INFRA_TEARDOWN), 0),
            boot_cycle: Timeout::new("boot_cycle", None, 0),
            console_activity: Timeout::new("console_activity", None, 0),
            first_console_activity: Timeout::new("first_console_activity", None, 0),
            watchdogs: HashMap::new(),
        }
    }
}

#[cfg(test)]
#[path = "timeout_tests.rs"]
mod tests;
