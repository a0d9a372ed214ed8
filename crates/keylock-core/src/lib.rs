// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Keylock credential vault.
//!
//! This crate provides the shared types, the persistence traits, the clock
//! abstraction, and the low-level error type used throughout the Keylock
//! workspace. Store backends implement the traits defined here.

pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::KeylockError;
pub use traits::{RateLimitStore, SecretStore};
pub use types::{
    EncryptedRecord, KdfAlgorithm, KdfParams, KnownProvider, ProviderId, RateLimitRecord,
    RecordMetadata,
};
