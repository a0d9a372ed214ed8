// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the stores, the crypto engine, and the vault service.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::KeylockError;

/// Maximum length of a provider identifier.
pub const MAX_PROVIDER_ID_LEN: usize = 64;

/// Validated identifier of a third-party API provider (`openai`, `anthropic`, ...).
///
/// Identifiers are 1..=64 chars of lowercase ASCII letters, digits, `-` or `_`.
/// A well-formed identifier need not name a [`KnownProvider`]; format rules for
/// API keys only exist for known providers and fail closed for the rest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderId(String);

impl ProviderId {
    /// Validate and wrap a provider identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, KeylockError> {
        let id = id.into();
        let well_formed = !id.is_empty()
            && id.len() <= MAX_PROVIDER_ID_LEN
            && id
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_');
        if well_formed {
            Ok(Self(id))
        } else {
            Err(KeylockError::InvalidProviderId(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The known provider this identifier names, if any.
    pub fn known(&self) -> Option<KnownProvider> {
        KnownProvider::from_str(&self.0).ok()
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProviderId {
    type Err = KeylockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ProviderId {
    type Error = KeylockError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProviderId> for String {
    fn from(id: ProviderId) -> Self {
        id.0
    }
}

impl From<KnownProvider> for ProviderId {
    fn from(provider: KnownProvider) -> Self {
        Self(provider.as_ref().to_string())
    }
}

impl AsRef<str> for ProviderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The closed set of providers whose API-key formats the vault understands.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum KnownProvider {
    OpenAi,
    Anthropic,
    OpenRouter,
}

/// Key-derivation algorithm identifier stored with every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum KdfAlgorithm {
    Argon2id,
}

/// Key-derivation parameters persisted alongside each encrypted record.
///
/// Records carry their own parameters so that raising the work factor for new
/// saves leaves older records decryptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub algorithm: KdfAlgorithm,
    /// Argon2 version number (0x13 = 19).
    pub version: u32,
    /// Memory cost in KiB.
    pub memory_cost: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl KdfParams {
    /// Argon2id v0x13 with the given work factors.
    pub fn argon2id(memory_cost: u32, iterations: u32, parallelism: u32) -> Self {
        Self {
            algorithm: KdfAlgorithm::Argon2id,
            version: 0x13,
            memory_cost,
            iterations,
            parallelism,
        }
    }
}

/// One encrypted API key, keyed by provider.
///
/// Holds only ciphertext and the public inputs needed to re-derive the key;
/// plaintext never appears here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedRecord {
    pub provider: ProviderId,
    /// AEAD output including the authentication tag.
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub salt: Vec<u8>,
    pub kdf_params: KdfParams,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Milliseconds since the Unix epoch.
    pub updated_at: i64,
}

impl EncryptedRecord {
    /// Metadata view of this record.
    pub fn metadata(&self) -> RecordMetadata {
        RecordMetadata {
            provider: self.provider.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Listing entry for a stored record: never carries ciphertext or plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub provider: ProviderId,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Failed-unlock bookkeeping for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub provider: ProviderId,
    /// Failures since the last success or expired lockout.
    pub failed_attempts: u32,
    /// End of the current lockout in ms since the epoch, if locked.
    pub locked_until: Option<i64>,
}

impl RateLimitRecord {
    /// A clean record with no failures.
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            failed_attempts: 0,
            locked_until: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use strum::IntoEnumIterator;

    #[test]
    fn known_providers_round_trip_through_provider_id() {
        for provider in KnownProvider::iter() {
            let id = ProviderId::from(provider);
            assert_eq!(id.known(), Some(provider));
            assert_eq!(id.as_str(), provider.to_string());
        }
    }

    #[test]
    fn known_provider_names_are_lowercase() {
        assert_eq!(KnownProvider::OpenAi.to_string(), "openai");
        assert_eq!(KnownProvider::Anthropic.to_string(), "anthropic");
        assert_eq!(KnownProvider::OpenRouter.to_string(), "openrouter");
    }

    #[test]
    fn unknown_but_well_formed_id_is_accepted() {
        let id: ProviderId = "non-existent".parse().unwrap();
        assert_eq!(id.known(), None);
    }

    #[test]
    fn malformed_ids_are_rejected() {
        for bad in ["", "OpenAI", "open ai", "a/b", "ключ"] {
            assert!(ProviderId::new(bad).is_err(), "{bad:?} should be rejected");
        }
        assert!(ProviderId::new("a".repeat(MAX_PROVIDER_ID_LEN + 1)).is_err());
    }

    #[test]
    fn provider_id_serde_validates() {
        let id: ProviderId = serde_json::from_str("\"anthropic\"").unwrap();
        assert_eq!(id.known(), Some(KnownProvider::Anthropic));
        assert!(serde_json::from_str::<ProviderId>("\"Not Valid\"").is_err());
    }

    #[test]
    fn kdf_params_json_shape() {
        let params = KdfParams::argon2id(65536, 3, 4);
        let json = serde_json::to_value(params).unwrap();
        assert_eq!(json["algorithm"], "argon2id");
        assert_eq!(json["version"], 19);
        assert_eq!(json["memory_cost"], 65536);
    }

    proptest! {
        #[test]
        fn generated_ids_match_charset(id in "[a-z0-9_-]{1,64}") {
            prop_assert!(ProviderId::new(id).is_ok());
        }
    }
}
