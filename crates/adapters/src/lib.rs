// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Bench Executor Contributors

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bx-adapters: collaborator interfaces at the edge of the executor.
//!
//! Each module defines one trait plus its production implementation and,
//! behind the `test-support` feature, a scriptable fake that records
//! calls. The engine is generic over these traits; nothing in here holds
//! job state.

pub mod artifacts;
pub mod bucket;
pub mod console_link;
pub mod flasher;
pub mod inventory;
pub mod pdu;

pub use artifacts::{ArtifactFetcher, FetchError, HttpFetcher};
pub use bucket::{BucketAdapter, BucketCredentials, BucketError, BucketHandle, NoOpBucket};
pub use console_link::{
    ClientInput, ClientLink, ConsoleConnector, DutReader, DutWriter, FramedClient, LinkError,
    NoClient, RawClient, TcpConsole, WireMessage,
};
pub use flasher::{BootImageFlasher, FlashError, NoOpFlasher};
pub use inventory::{HttpInventory, Inventory, InventoryError, NoOpInventory};
pub use pdu::{CommandPdu, PduError, PduPort, PduState};

#[cfg(any(test, feature = "test-support"))]
pub use artifacts::{FakeFetcher, FetchCall};
#[cfg(any(test, feature = "test-support"))]
pub use bucket::{BucketCall, FakeBucket};
#[cfg(any(test, feature = "test-support"))]
pub use console_link::{FakeClient, FakeClientSeen, FakeConsole};
#[cfg(any(test, feature = "test-support"))]
pub use flasher::FakeFlasher;
#[cfg(any(test, feature = "test-support"))]
pub use inventory::FakeInventory;
#[cfg(any(test, feature = "test-support"))]
pub use pdu::FakePdu;
