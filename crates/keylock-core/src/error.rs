// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared by the Keylock crates below the vault service boundary.

use thiserror::Error;

/// The primary error type used by stores, configuration, and crypto plumbing.
///
/// The vault service converts these into its stable error codes before they
/// reach a caller.
#[derive(Debug, Error)]
pub enum KeylockError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, migrations).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A persisted record exists but cannot be parsed back into its typed form.
    #[error("stored record for `{provider}` is unreadable")]
    CorruptRecord { provider: String },

    /// A provider identifier failed validation.
    #[error("invalid provider identifier `{0}`")]
    InvalidProviderId(String),

    /// Vault operation errors (key derivation, random generation, prompts).
    #[error("vault error: {0}")]
    Vault(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl KeylockError {
    /// Wrap any error as a storage failure.
    pub fn storage<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            source: Box::new(source),
        }
    }
}
