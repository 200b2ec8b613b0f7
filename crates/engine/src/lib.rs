// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bx-engine: the job execution core.
//!
//! Two tasks per job: the executor phase loop ([`executor`]) and the
//! console relay ([`relay`]). The relay exclusively owns both I/O
//! endpoints; the executor only requests state transitions and samples
//! read-only views, which is what keeps the socket handling lock-free.

pub mod error;
pub mod executor;
pub mod relay;

pub use error::ExecuteError;
pub use executor::{Executor, ExecutorHandle, ExecutorTuning};
pub use relay::{JobConsole, RelayError, RelayState};
