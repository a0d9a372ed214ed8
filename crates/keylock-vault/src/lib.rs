// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Password-gated API key vault.
//!
//! Each provider's key is sealed with AES-256-GCM under a key derived from a
//! user password via Argon2id. Unlock attempts are rate limited per provider,
//! and decrypted keys live only in an in-memory session cache that expires on
//! an absolute and an inactivity timer.

pub mod crypto;
pub mod error;
pub mod kdf;
pub mod prompt;
pub mod rate_limit;
pub mod service;
pub mod session;
pub mod validator;

pub use crypto::{CryptoError, SealedSecret};
pub use error::{ErrorCode, ErrorPayload, VaultError};
pub use rate_limit::{LimitStatus, RateLimiter, MAX_ATTEMPTS};
pub use service::{
    ChangePasswordRequest, KeyState, ProviderStatus, SaveKeyRequest, VaultOptions, VaultService,
};
pub use session::SessionPolicy;
pub use validator::{
    api_key_format_hint, mask_api_key, password_requirements, validate_api_key,
    validate_password, PasswordRequirement, PasswordRule, PasswordValidation,
};
