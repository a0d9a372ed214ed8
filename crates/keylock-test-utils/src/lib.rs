// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Keylock integration tests.
//!
//! # Components
//!
//! - [`TestHarness`] - Vault service over temp storage with a manual clock
//! - [`MemoryStore`] - In-memory secret and rate-limit store with failure injection

pub mod harness;
pub mod memory_store;

pub use harness::{
    fast_kdf, provider, secret, Backend, TestHarness, TestHarnessBuilder, TEST_ANTHROPIC_KEY,
    TEST_EPOCH_MS, TEST_NEW_PASSWORD, TEST_OPENAI_KEY, TEST_OPENROUTER_KEY, TEST_PASSWORD,
    WRONG_PASSWORD,
};
pub use memory_store::MemoryStore;
