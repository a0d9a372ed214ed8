// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vault service error taxonomy.
//!
//! Every failure that crosses the service boundary carries a stable
//! [`ErrorCode`] so callers can branch without parsing messages.

use keylock_core::{KeylockError, ProviderId};
use serde::Serialize;
use strum::Display;
use thiserror::Error;

use crate::validator::PasswordRule;

/// Stable, machine-readable failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PasswordsMismatch,
    InvalidPassword,
    InvalidApiKey,
    KeyNotFound,
    WrongPassword,
    RateLimited,
    StorageError,
    InternalError,
}

/// Failure of a vault service operation.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Password and confirmation differ.
    #[error("passwords do not match")]
    PasswordsMismatch,

    /// Password fails one or more strength rules.
    #[error("password does not meet requirements: {}", describe_rules(.violations))]
    InvalidPassword { violations: Vec<PasswordRule> },

    /// API key does not match the provider's format, or the provider is unsupported.
    #[error("API key format is invalid for provider `{provider}`")]
    InvalidApiKey { provider: ProviderId },

    /// No encrypted record exists for the provider.
    #[error("no key stored for provider `{provider}`")]
    KeyNotFound { provider: ProviderId },

    /// Decryption failed. Covers both a wrong password and a damaged record.
    #[error("wrong password")]
    WrongPassword,

    /// Too many recent failures for this provider.
    #[error("too many failed attempts, retry in {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    /// The secret or rate-limit store could not be reached.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Unexpected engine failure (RNG, KDF parameters, task join).
    #[error("internal error: {0}")]
    Internal(String),
}

impl VaultError {
    pub fn code(&self) -> ErrorCode {
        match self {
            VaultError::PasswordsMismatch => ErrorCode::PasswordsMismatch,
            VaultError::InvalidPassword { .. } => ErrorCode::InvalidPassword,
            VaultError::InvalidApiKey { .. } => ErrorCode::InvalidApiKey,
            VaultError::KeyNotFound { .. } => ErrorCode::KeyNotFound,
            VaultError::WrongPassword => ErrorCode::WrongPassword,
            VaultError::RateLimited { .. } => ErrorCode::RateLimited,
            VaultError::Storage(_) => ErrorCode::StorageError,
            VaultError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Milliseconds until the lockout ends, for [`VaultError::RateLimited`].
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            VaultError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }

    /// Serializable form for JSON output.
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code(),
            message: self.to_string(),
            violations: match self {
                VaultError::InvalidPassword { violations } => violations.clone(),
                _ => Vec::new(),
            },
            retry_after_ms: self.retry_after_ms(),
        }
    }
}

impl From<KeylockError> for VaultError {
    fn from(err: KeylockError) -> Self {
        match err {
            // Unreadable records are indistinguishable from a wrong password.
            KeylockError::CorruptRecord { .. } => VaultError::WrongPassword,
            KeylockError::Storage { source } => VaultError::Storage(source.to_string()),
            other => VaultError::Internal(other.to_string()),
        }
    }
}

/// Structured error body returned to UI and CLI callers.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<PasswordRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

fn describe_rules(rules: &[PasswordRule]) -> String {
    rules
        .iter()
        .map(|rule| rule.description())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_render_in_screaming_snake_case() {
        assert_eq!(ErrorCode::PasswordsMismatch.to_string(), "PASSWORDS_MISMATCH");
        assert_eq!(ErrorCode::InvalidApiKey.to_string(), "INVALID_API_KEY");
        assert_eq!(ErrorCode::KeyNotFound.to_string(), "KEY_NOT_FOUND");
        assert_eq!(ErrorCode::RateLimited.to_string(), "RATE_LIMITED");
    }

    #[test]
    fn corrupt_record_maps_to_wrong_password() {
        let err: VaultError = KeylockError::CorruptRecord {
            provider: "openai".into(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::WrongPassword);
    }

    #[test]
    fn storage_failure_maps_to_storage_error() {
        let err: VaultError = KeylockError::storage(std::io::Error::other("disk gone")).into();
        assert_eq!(err.code(), ErrorCode::StorageError);
        assert!(err.to_string().contains("disk gone"));
    }

    #[test]
    fn payload_carries_details() {
        let limited = VaultError::RateLimited {
            retry_after_ms: 1500,
        };
        let json = serde_json::to_value(limited.payload()).unwrap();
        assert_eq!(json["code"], "RATE_LIMITED");
        assert_eq!(json["retry_after_ms"], 1500);
        assert!(json.get("violations").is_none());

        let weak = VaultError::InvalidPassword {
            violations: vec![PasswordRule::MinLength, PasswordRule::Digit],
        };
        let json = serde_json::to_value(weak.payload()).unwrap();
        assert_eq!(json["code"], "INVALID_PASSWORD");
        assert_eq!(json["violations"], serde_json::json!(["min_length", "digit"]));
    }

    #[test]
    fn wrong_password_message_is_generic() {
        assert_eq!(VaultError::WrongPassword.to_string(), "wrong password");
    }
}
