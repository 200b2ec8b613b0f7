// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

//! Power distribution unit port control.
//!
//! The executor serializes every `set()` through its own task, so the
//! trait takes `&self` and implementations only need interior mutability
//! for bookkeeping (last-off tracking for `min_off_time`).

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Desired power state of the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduState {
    On,
    Off,
}

impl fmt::Display for PduState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PduState::On => write!(f, "ON"),
            PduState::Off => write!(f, "OFF"),
        }
    }
}

/// Errors from PDU operations.
#[derive(Debug, Error)]
pub enum PduError {
    #[error("PDU command failed: {0}")]
    CommandFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One switchable port on a power distribution unit.
///
/// Once `set(Off)` has returned, at least `min_off_time` elapses before
/// a later `set(On)` takes effect; the implementation enforces this, not
/// the caller.
#[async_trait]
pub trait PduPort: Clone + Send + Sync + 'static {
    async fn set(&self, state: PduState) -> Result<(), PduError>;

    fn min_off_time(&self) -> Duration;
}

/// PDU port driven by external on/off commands (run through `sh -c`).
#[derive(Clone)]
pub struct CommandPdu {
    on_cmd: String,
    off_cmd: String,
    min_off_time: Duration,
    last_off: Arc<Mutex<Option<Instant>>>,
}

impl CommandPdu {
    pub fn new(on_cmd: impl Into<String>, off_cmd: impl Into<String>, min_off_time: Duration) -> Self {
        Self {
            on_cmd: on_cmd.into(),
            off_cmd: off_cmd.into(),
            min_off_time,
            last_off: Arc::new(Mutex::new(None)),
        }
    }

    async fn run(&self, cmd: &str) -> Result<(), PduError> {
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PduError::CommandFailed(format!(
                "{cmd}: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PduPort for CommandPdu {
    async fn set(&self, state: PduState) -> Result<(), PduError> {
        match state {
            PduState::Off => {
                self.run(&self.off_cmd).await?;
                *self.last_off.lock() = Some(Instant::now());
            }
            PduState::On => {
                // Hold the port down for the remainder of min_off_time.
                let remaining = self.last_off.lock().map(|off| {
                    self.min_off_time
                        .saturating_sub(off.elapsed())
                });
                if let Some(remaining) = remaining {
                    if !remaining.is_zero() {
                        debug!(?remaining, "enforcing minimum off time");
                        tokio::time::sleep(remaining).await;
                    }
                }
                self.run(&self.on_cmd).await?;
            }
        }
        Ok(())
    }

    fn min_off_time(&self) -> Duration {
        self.min_off_time
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;

    struct FakePduState {
        transitions: Vec<(PduState, Instant)>,
        fail_next: Option<String>,
    }

    /// Fake PDU port that records every transition.
    #[derive(Clone)]
    pub struct FakePdu {
        min_off_time: Duration,
        inner: Arc<Mutex<FakePduState>>,
    }

    impl Default for FakePdu {
        fn default() -> Self {
            Self {
                min_off_time: Duration::ZERO,
                inner: Arc::new(Mutex::new(FakePduState {
                    transitions: Vec::new(),
                    fail_next: None,
                })),
            }
        }
    }

    impl FakePdu {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_min_off_time(min_off_time: Duration) -> Self {
            Self {
                min_off_time,
                ..Self::default()
            }
        }

        /// Make the next `set()` call fail with the given message.
        pub fn fail_next(&self, message: impl Into<String>) {
            self.inner.lock().fail_next = Some(message.into());
        }

        /// Every recorded transition, in order.
        pub fn transitions(&self) -> Vec<PduState> {
            self.inner.lock().transitions.iter().map(|(s, _)| *s).collect()
        }

        /// Number of Off→On edges observed (power cycles).
        pub fn power_cycles(&self) -> usize {
            let transitions = self.transitions();
            transitions
                .windows(2)
                .filter(|w| w[0] == PduState::Off && w[1] == PduState::On)
                .count()
        }

        /// The most recent state, if any transition happened.
        pub fn current_state(&self) -> Option<PduState> {
            self.inner.lock().transitions.last().map(|(s, _)| *s)
        }
    }

    #[async_trait]
    impl PduPort for FakePdu {
        async fn set(&self, state: PduState) -> Result<(), PduError> {
            let mut inner = self.inner.lock();
            if let Some(message) = inner.fail_next.take() {
                return Err(PduError::CommandFailed(message));
            }
            inner.transitions.push((state, Instant::now()));
            Ok(())
        }

        fn min_off_time(&self) -> Duration {
            self.min_off_time
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakePdu;

#[cfg(test)]
#[path = "pdu_tests.rs"]
mod tests;
