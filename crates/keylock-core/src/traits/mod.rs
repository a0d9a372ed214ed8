// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence traits consumed by the vault service.
//!
//! Both traits use `#[async_trait]` so the service can hold them as
//! `Arc<dyn ...>` and tests can swap in in-memory implementations.

pub mod rate_limit_store;
pub mod secret_store;

pub use rate_limit_store::RateLimitStore;
pub use secret_store::SecretStore;
