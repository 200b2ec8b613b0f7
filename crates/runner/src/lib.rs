// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

//! Bench Executor runner library
//!
//! Exposes the control protocol and runner configuration for use by
//! control clients.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod listener;
pub mod protocol;

pub use config::RunnerConfig;
pub use listener::Listener;
pub use protocol::{
    Request, Response, DEFAULT_TIMEOUT, MAX_MESSAGE_SIZE, PROTOCOL_VERSION,
};
