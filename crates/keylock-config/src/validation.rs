// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks ranges that serde cannot express: KDF work factors, session
//! timeouts, lockout window, log level, database path.

use crate::diagnostic::ConfigError;
use crate::model::KeylockConfig;

/// Smallest accepted Argon2id memory cost (32 MiB).
pub const MIN_KDF_MEMORY_COST: u32 = 32768;
/// Largest accepted Argon2id memory cost (1 GiB).
pub const MAX_KDF_MEMORY_COST: u32 = 1_048_576;
/// Session timeouts are bounded to the minutes-to-hours range.
pub const SESSION_TIMEOUT_RANGE_SECS: std::ops::RangeInclusive<u64> = 60..=86_400;
pub const LOCKOUT_RANGE_SECS: std::ops::RangeInclusive<u64> = 1..=3_600;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &KeylockConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut invalid = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        invalid("storage.database_path must not be empty".to_string());
    }

    let vault = &config.vault;
    if !(MIN_KDF_MEMORY_COST..=MAX_KDF_MEMORY_COST).contains(&vault.kdf_memory_cost) {
        invalid(format!(
            "vault.kdf_memory_cost must be between {MIN_KDF_MEMORY_COST} and {MAX_KDF_MEMORY_COST} KiB, got {}",
            vault.kdf_memory_cost
        ));
    }
    if vault.kdf_iterations < 2 {
        invalid(format!(
            "vault.kdf_iterations must be at least 2, got {}",
            vault.kdf_iterations
        ));
    }
    if !(1..=16).contains(&vault.kdf_parallelism) {
        invalid(format!(
            "vault.kdf_parallelism must be between 1 and 16, got {}",
            vault.kdf_parallelism
        ));
    }

    let session = &config.session;
    if !SESSION_TIMEOUT_RANGE_SECS.contains(&session.absolute_timeout_secs) {
        invalid(format!(
            "session.absolute_timeout_secs must be between 60 and 86400, got {}",
            session.absolute_timeout_secs
        ));
    }
    if session.inactivity_timeout_secs != 0
        && !SESSION_TIMEOUT_RANGE_SECS.contains(&session.inactivity_timeout_secs)
    {
        invalid(format!(
            "session.inactivity_timeout_secs must be 0 (disabled) or between 60 and 86400, got {}",
            session.inactivity_timeout_secs
        ));
    }

    if !LOCKOUT_RANGE_SECS.contains(&config.rate_limit.lockout_duration_secs) {
        invalid(format!(
            "rate_limit.lockout_duration_secs must be between 1 and 3600, got {}",
            config.rate_limit.lockout_duration_secs
        ));
    }

    let level = config.logging.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        invalid(format!(
            "logging.level `{}` is not one of {}",
            config.logging.level,
            LOG_LEVELS.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
