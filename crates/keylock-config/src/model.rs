// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Keylock credential vault.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Keylock configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeylockConfig {
    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Key-derivation settings for new encryptions.
    #[serde(default)]
    pub vault: VaultConfig,

    /// Unlocked-key cache expiry.
    #[serde(default)]
    pub session: SessionConfig,

    /// Failed-unlock lockout settings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("keylock").join("keylock.db"))
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "keylock.db".to_string())
}

fn default_wal_mode() -> bool {
    true
}

/// Argon2id parameters applied to every new encryption.
///
/// Existing records keep the parameters they were written with.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB).
    #[serde(default = "default_kdf_memory_cost")]
    pub kdf_memory_cost: u32,

    /// Argon2id iteration count (default: 3).
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    /// Argon2id parallelism lanes (default: 4).
    #[serde(default = "default_kdf_parallelism")]
    pub kdf_parallelism: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf_memory_cost: default_kdf_memory_cost(),
            kdf_iterations: default_kdf_iterations(),
            kdf_parallelism: default_kdf_parallelism(),
        }
    }
}

fn default_kdf_memory_cost() -> u32 {
    65536 // 64 MiB per OWASP recommendation
}

fn default_kdf_iterations() -> u32 {
    3
}

fn default_kdf_parallelism() -> u32 {
    4
}

/// Expiry policy for keys held in the unlocked-key cache.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Absolute lifetime of an unlocked key, in seconds (default: 3600).
    #[serde(default = "default_absolute_timeout_secs")]
    pub absolute_timeout_secs: u64,

    /// Idle time after which an unlocked key expires, in seconds (default: 900).
    /// `0` disables inactivity expiry.
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,
}

impl SessionConfig {
    pub fn absolute_timeout(&self) -> Duration {
        Duration::from_secs(self.absolute_timeout_secs)
    }

    /// `None` when inactivity expiry is disabled.
    pub fn inactivity_timeout(&self) -> Option<Duration> {
        (self.inactivity_timeout_secs > 0).then(|| Duration::from_secs(self.inactivity_timeout_secs))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            absolute_timeout_secs: default_absolute_timeout_secs(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
        }
    }
}

fn default_absolute_timeout_secs() -> u64 {
    3600
}

fn default_inactivity_timeout_secs() -> u64 {
    900
}

/// Lockout applied after repeated failed unlocks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Lockout window once the attempt limit is reached, in seconds (default: 60).
    #[serde(default = "default_lockout_duration_secs")]
    pub lockout_duration_secs: u64,
}

impl RateLimitConfig {
    pub fn lockout_duration(&self) -> Duration {
        Duration::from_secs(self.lockout_duration_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            lockout_duration_secs: default_lockout_duration_secs(),
        }
    }
}

fn default_lockout_duration_secs() -> u64 {
    60
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
