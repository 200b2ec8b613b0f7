// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

//! Per-job ephemeral storage buckets.
//!
//! The executor only needs create / credentials / remove; provisioning
//! details stay behind this trait. `create` may return `None` when the
//! deployment has no object store at all.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from bucket operations.
#[derive(Debug, Error)]
pub enum BucketError {
    #[error("bucket operation failed: {0}")]
    Failed(String),
}

/// Access credentials for one role on a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCredentials {
    pub access_key: String,
    pub secret_key: String,
}

/// Handle to a provisioned job bucket, passed to the client at teardown.
/// The owner credentials let the client keep using the bucket after the
/// session is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketHandle {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub credentials: Option<BucketCredentials>,
}

/// Object-storage collaborator for job artifacts and results.
#[async_trait]
pub trait BucketAdapter: Clone + Send + Sync + 'static {
    /// Provision a bucket for this job. `None` means bucket storage is
    /// not configured; the job runs without one.
    async fn create(&self, job_id: &str, machine_id: &str)
        -> Result<Option<BucketHandle>, BucketError>;

    /// Finish provisioning (policies, initial objects).
    async fn setup(&self, bucket: &BucketHandle) -> Result<(), BucketError>;

    /// Issue credentials for a role on this bucket.
    async fn credentials(
        &self,
        bucket: &BucketHandle,
        role: &str,
    ) -> Result<BucketCredentials, BucketError>;

    /// Tear the bucket down.
    async fn remove(&self, bucket: &BucketHandle) -> Result<(), BucketError>;
}

/// Bucket adapter for deployments without object storage.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpBucket;

impl NoOpBucket {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BucketAdapter for NoOpBucket {
    async fn create(
        &self,
        _job_id: &str,
        _machine_id: &str,
    ) -> Result<Option<BucketHandle>, BucketError> {
        Ok(None)
    }

    async fn setup(&self, _bucket: &BucketHandle) -> Result<(), BucketError> {
        Ok(())
    }

    async fn credentials(
        &self,
        _bucket: &BucketHandle,
        _role: &str,
    ) -> Result<BucketCredentials, BucketError> {
        Ok(BucketCredentials {
            access_key: String::new(),
            secret_key: String::new(),
        })
    }

    async fn remove(&self, _bucket: &BucketHandle) -> Result<(), BucketError> {
        Ok(())
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Recorded bucket call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum BucketCall {
        Create { job_id: String, machine_id: String },
        Setup { name: String },
        Credentials { name: String, role: String },
        Remove { name: String },
    }

    struct FakeBucketState {
        calls: Vec<BucketCall>,
    }

    /// Fake bucket adapter that provisions a deterministic handle and
    /// records every call.
    #[derive(Clone)]
    pub struct FakeBucket {
        inner: Arc<Mutex<FakeBucketState>>,
    }

    impl Default for FakeBucket {
        fn default() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeBucketState { calls: Vec::new() })),
            }
        }
    }

    impl FakeBucket {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<BucketCall> {
            self.inner.lock().calls.clone()
        }

        pub fn removed_count(&self) -> usize {
            self.inner
                .lock()
                .calls
                .iter()
                .filter(|c| matches!(c, BucketCall::Remove { .. }))
                .count()
        }
    }

    #[async_trait]
    impl BucketAdapter for FakeBucket {
        async fn create(
            &self,
            job_id: &str,
            machine_id: &str,
        ) -> Result<Option<BucketHandle>, BucketError> {
            self.inner.lock().calls.push(BucketCall::Create {
                job_id: job_id.to_string(),
                machine_id: machine_id.to_string(),
            });
            Ok(Some(BucketHandle {
                name: format!("job-{job_id}"),
                url: format!("http://bucket.local/job-{job_id}"),
                credentials: None,
            }))
        }

        async fn setup(&self, bucket: &BucketHandle) -> Result<(), BucketError> {
            self.inner.lock().calls.push(BucketCall::Setup {
                name: bucket.name.clone(),
            });
            Ok(())
        }

        async fn credentials(
            &self,
            bucket: &BucketHandle,
            role: &str,
        ) -> Result<BucketCredentials, BucketError> {
            self.inner.lock().calls.push(BucketCall::Credentials {
                name: bucket.name.clone(),
                role: role.to_string(),
            });
            Ok(BucketCredentials {
                access_key: format!("{role}-key"),
                secret_key: "hunter2".to_string(),
            })
        }

        async fn remove(&self, bucket: &BucketHandle) -> Result<(), BucketError> {
            self.inner.lock().calls.push(BucketCall::Remove {
                name: bucket.name.clone(),
            });
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{BucketCall, FakeBucket};
