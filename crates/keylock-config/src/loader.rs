// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./keylock.toml` > `~/.config/keylock/keylock.toml` > `/etc/keylock/keylock.toml`
//! with environment variable overrides via `KEYLOCK_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::KeylockConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/keylock/keylock.toml` (system-wide)
/// 3. `~/.config/keylock/keylock.toml` (user XDG config)
/// 4. `./keylock.toml` (local directory)
/// 5. `KEYLOCK_*` environment variables
pub fn load_config() -> Result<KeylockConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<KeylockConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KeylockConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<KeylockConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KeylockConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(KeylockConfig::default()))
        .merge(Toml::file("/etc/keylock/keylock.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("keylock/keylock.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("keylock.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because keys contain
/// underscores: `KEYLOCK_RATE_LIMIT_LOCKOUT_DURATION_SECS` must map to
/// `rate_limit.lockout_duration_secs`.
///
/// `KEYLOCK_PASSWORD`, `KEYLOCK_NEW_PASSWORD` and `KEYLOCK_API_KEY` carry
/// secrets for the CLI and are not configuration keys, so they are ignored here.
fn env_provider() -> Env {
    Env::prefixed("KEYLOCK_")
        .ignore(&["password", "new_password", "api_key"])
        .map(|key| {
            // `key` is the lowercased env var name with prefix stripped.
            let key_str = key.as_str();
            let mapped = key_str
                .replacen("storage_", "storage.", 1)
                .replacen("vault_", "vault.", 1)
                .replacen("session_", "session.", 1)
                .replacen("rate_limit_", "rate_limit.", 1)
                .replacen("logging_", "logging.", 1);
            mapped.into()
        })
}
