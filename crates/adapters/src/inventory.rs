// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

//! Machine inventory reporting.
//!
//! Used once per job at most: when the console classifier flags the
//! machine as unfit for service, the executor reports it so the
//! scheduler stops assigning jobs to it. Best-effort; failures are
//! logged, never retried.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from inventory reporting.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("inventory report failed: {0}")]
    Failed(String),
}

/// External machine-inventory collaborator.
#[async_trait]
pub trait Inventory: Clone + Send + Sync + 'static {
    async fn report_unfit(&self, machine_id: &str) -> Result<(), InventoryError>;
}

/// Inventory adapter for labs without an inventory service.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpInventory;

impl NoOpInventory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Inventory for NoOpInventory {
    async fn report_unfit(&self, _machine_id: &str) -> Result<(), InventoryError> {
        Ok(())
    }
}

/// Inventory backed by an HTTP endpoint.
#[derive(Clone)]
pub struct HttpInventory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpInventory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Inventory for HttpInventory {
    async fn report_unfit(&self, machine_id: &str) -> Result<(), InventoryError> {
        let url = format!("{}/api/v1/machine/{}/unfit", self.base_url, machine_id);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| InventoryError::Failed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(InventoryError::Failed(format!(
                "HTTP {} from {url}",
                response.status()
            )));
        }
        Ok(())
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Fake inventory that records reported machines.
    #[derive(Clone, Default)]
    pub struct FakeInventory {
        reported: Arc<Mutex<Vec<String>>>,
    }

    impl FakeInventory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reported(&self) -> Vec<String> {
            self.reported.lock().clone()
        }
    }

    #[async_trait]
    impl Inventory for FakeInventory {
        async fn report_unfit(&self, machine_id: &str) -> Result<(), InventoryError> {
            self.reported.lock().push(machine_id.to_string());
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeInventory;
