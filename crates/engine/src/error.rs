// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

//! Error types for the execution engine.

use bx_adapters::{BucketError, FetchError, FlashError, LinkError, PduError};
use thiserror::Error;

use crate::relay::RelayError;

/// Errors that abort a job run.
///
/// These bubble up through the phase functions to the single top-level
/// handler in `Executor::run`, which performs the unconditional
/// session-end cleanup and maps the job to INCOMPLETE.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("PDU error: {0}")]
    Pdu(#[from] PduError),

    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("bucket error: {0}")]
    Bucket(#[from] BucketError),

    #[error("console link error: {0}")]
    Link(#[from] LinkError),

    #[error("flash error: {0}")]
    Flash(#[from] FlashError),

    #[error("console relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("giving up on downloading {url} after {attempts} attempts")]
    DownloadExhausted { url: String, attempts: u32 },
}
