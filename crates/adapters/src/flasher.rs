// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

//! Boot-image build-and-flash side path for fastboot targets.
//!
//! Platforms that cannot network-boot get a boot image assembled from
//! the resolved boot configuration and pushed over fastboot. Image
//! construction itself is out of scope here; implementations shell out.

use async_trait::async_trait;
use bx_core::BootConfig;
use thiserror::Error;

/// Errors from the flash path.
#[derive(Debug, Error)]
pub enum FlashError {
    #[error("missing {field} in boot config for fastboot")]
    MissingField { field: &'static str },

    #[error("flash failed: {0}")]
    Failed(String),
}

/// Builds a boot image from a boot config and boots the DUT with it.
#[async_trait]
pub trait BootImageFlasher: Clone + Send + Sync + 'static {
    async fn build_and_boot(&self, boot: &BootConfig) -> Result<(), FlashError>;
}

/// Flasher for labs without fastboot targets.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpFlasher;

impl NoOpFlasher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BootImageFlasher for NoOpFlasher {
    async fn build_and_boot(&self, _boot: &BootConfig) -> Result<(), FlashError> {
        Ok(())
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Fake flasher that records boot configs it was asked to flash.
    #[derive(Clone, Default)]
    pub struct FakeFlasher {
        flashed: Arc<Mutex<Vec<BootConfig>>>,
    }

    impl FakeFlasher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn flashed(&self) -> Vec<BootConfig> {
            self.flashed.lock().clone()
        }
    }

    #[async_trait]
    impl BootImageFlasher for FakeFlasher {
        async fn build_and_boot(&self, boot: &BootConfig) -> Result<(), FlashError> {
            self.flashed.lock().push(boot.clone());
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeFlasher;
