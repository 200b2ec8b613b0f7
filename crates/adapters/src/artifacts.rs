// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

//! Artifact download for the infra-setup phase.
//!
//! A fetcher performs exactly one attempt; the executor owns the retry
//! policy (attempt count and inter-attempt delay) so tests can tune it.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Errors from artifact fetching.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed for {url}: {message}")]
    Request { url: String, message: String },

    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Downloads one artifact to a local path.
#[async_trait]
pub trait ArtifactFetcher: Clone + Send + Sync + 'static {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// HTTP fetcher backed by a shared reqwest client.
#[derive(Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        debug!(url, dest = %dest.display(), "fetching artifact");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(|e| FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;

    /// Recorded fetch call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct FetchCall {
        pub url: String,
        pub dest: PathBuf,
    }

    struct FakeFetcherState {
        calls: Vec<FetchCall>,
        // Remaining failures per URL before a fetch succeeds.
        fail_remaining: HashMap<String, u32>,
    }

    /// Fake fetcher: creates empty files, scriptable per-URL failures.
    #[derive(Clone)]
    pub struct FakeFetcher {
        inner: Arc<Mutex<FakeFetcherState>>,
    }

    impl Default for FakeFetcher {
        fn default() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeFetcherState {
                    calls: Vec::new(),
                    fail_remaining: HashMap::new(),
                })),
            }
        }
    }

    impl FakeFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail the next `count` fetches of `url` before succeeding.
        pub fn fail_times(&self, url: &str, count: u32) {
            self.inner.lock().fail_remaining.insert(url.to_string(), count);
        }

        pub fn calls(&self) -> Vec<FetchCall> {
            self.inner.lock().calls.clone()
        }

        pub fn attempts_for(&self, url: &str) -> usize {
            self.inner
                .lock()
                .calls
                .iter()
                .filter(|c| c.url == url)
                .count()
        }
    }

    #[async_trait]
    impl ArtifactFetcher for FakeFetcher {
        async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
            {
                let mut inner = self.inner.lock();
                inner.calls.push(FetchCall {
                    url: url.to_string(),
                    dest: dest.to_path_buf(),
                });
                if let Some(remaining) = inner.fail_remaining.get_mut(url) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(FetchError::Request {
                            url: url.to_string(),
                            message: "scripted failure".to_string(),
                        });
                    }
                }
            }
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(dest, b"").await?;
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeFetcher, FetchCall};
