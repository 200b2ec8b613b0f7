// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bx-core: state machines and configuration types for the Bench Executor.
//!
//! Everything in this crate is synchronous and I/O-free: timeouts and
//! watchdogs take explicit `Instant` arguments, console classification
//! operates on byte slices, and job configuration is parsed from YAML
//! into validated structs. The engine crate drives these types from its
//! async tasks.

pub mod clock;
pub mod console;
pub mod job;
pub mod status;
pub mod time_fmt;
pub mod timeout;

pub use clock::{Clock, FakeClock, SystemClock};
pub use console::{ConsolePatterns, ConsoleState, Pattern, Watchdog, WatchdogEvent};
pub use job::{BootConfig, ConfigError, Deployment, DeploymentState, Job, Target};
pub use status::JobStatus;
pub use time_fmt::format_relative;
pub use timeout::{Timeout, TimeoutSpec, Timeouts, TimeoutsSpec};
