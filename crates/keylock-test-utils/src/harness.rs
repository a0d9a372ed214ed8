// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for vault integration testing.
//!
//! `TestHarness` assembles a `VaultService` over either a temp SQLite
//! database or a [`MemoryStore`], with a [`ManualClock`] and a low-cost KDF
//! so tests can drive lockouts and session expiry deterministically.

use std::sync::Arc;
use std::time::Duration;

use keylock_config::model::StorageConfig;
use keylock_core::{KdfParams, KeylockError, ManualClock, ProviderId, RateLimitStore, SecretStore};
use keylock_storage::SqliteStorage;
use keylock_vault::{SaveKeyRequest, SessionPolicy, VaultError, VaultOptions, VaultService};
use secrecy::SecretString;

use crate::memory_store::MemoryStore;

/// Password that satisfies every strength rule.
pub const TEST_PASSWORD: &str = "StrongPassword123!";
/// A second valid password, for change-password tests.
pub const TEST_NEW_PASSWORD: &str = "EvenStronger456?";
/// A valid password that is not the one used to save.
pub const WRONG_PASSWORD: &str = "WrongPassword123!";
pub const TEST_OPENAI_KEY: &str = "sk-proj-abcdefghijklmnopqrstuvwxyz123456";
pub const TEST_ANTHROPIC_KEY: &str = "sk-ant-REDACTED";
pub const TEST_OPENROUTER_KEY: &str = "sk-or-v1-0123456789abcdef0123456789abcdef";

/// Clock origin for harness tests (2023-11-14T22:13:20Z).
pub const TEST_EPOCH_MS: i64 = 1_700_000_000_000;

/// Argon2id parameters cheap enough for unit tests.
pub fn fast_kdf() -> KdfParams {
    KdfParams::argon2id(1024, 1, 1)
}

pub fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

/// Parse a provider id, panicking on malformed input.
pub fn provider(id: &str) -> ProviderId {
    match id.parse() {
        Ok(id) => id,
        Err(e) => panic!("invalid provider id in test: {e}"),
    }
}

/// Which store backs the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Memory,
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    backend: Backend,
    lockout: Duration,
    session: SessionPolicy,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            backend: Backend::Sqlite,
            lockout: Duration::from_secs(60),
            session: SessionPolicy::default(),
        }
    }

    /// Use an in-memory store instead of SQLite.
    pub fn in_memory(mut self) -> Self {
        self.backend = Backend::Memory;
        self
    }

    pub fn with_lockout(mut self, lockout: Duration) -> Self {
        self.lockout = lockout;
        self
    }

    pub fn with_session(mut self, session: SessionPolicy) -> Self {
        self.session = session;
        self
    }

    /// Build the test harness, creating the store and the service.
    pub async fn build(self) -> Result<TestHarness, KeylockError> {
        let temp_dir = tempfile::TempDir::new().map_err(KeylockError::storage)?;
        let clock = ManualClock::new(TEST_EPOCH_MS);

        let (secrets, limits, sqlite, memory): (
            Arc<dyn SecretStore>,
            Arc<dyn RateLimitStore>,
            Option<SqliteStorage>,
            Option<MemoryStore>,
        ) = match self.backend {
            Backend::Sqlite => {
                let db_path = temp_dir.path().join("test.db");
                let storage = SqliteStorage::open(&StorageConfig {
                    database_path: db_path.to_string_lossy().to_string(),
                    wal_mode: true,
                })
                .await?;
                (
                    Arc::new(storage.clone()),
                    Arc::new(storage.clone()),
                    Some(storage),
                    None,
                )
            }
            Backend::Memory => {
                let store = MemoryStore::new();
                (
                    Arc::new(store.clone()),
                    Arc::new(store.clone()),
                    None,
                    Some(store),
                )
            }
        };

        let options = VaultOptions {
            kdf: fast_kdf(),
            session: self.session,
            lockout: self.lockout,
            clock: Arc::new(clock.clone()),
        };
        let service = Arc::new(VaultService::new(secrets, limits, options));

        Ok(TestHarness {
            service,
            clock,
            sqlite,
            memory,
            _temp_dir: temp_dir,
        })
    }
}

/// A vault service over temp storage with a controllable clock.
pub struct TestHarness {
    pub service: Arc<VaultService>,
    pub clock: ManualClock,
    /// Set for [`Backend::Sqlite`].
    pub sqlite: Option<SqliteStorage>,
    /// Set for [`Backend::Memory`].
    pub memory: Option<MemoryStore>,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Save `api_key` for `provider` under [`TEST_PASSWORD`].
    pub async fn save(&self, provider_id: &str, api_key: &str) -> Result<(), VaultError> {
        self.service
            .save_key(SaveKeyRequest {
                provider: provider(provider_id),
                api_key: secret(api_key),
                password: secret(TEST_PASSWORD),
                confirm_password: secret(TEST_PASSWORD),
            })
            .await
    }

    pub async fn unlock(&self, provider_id: &str, password: &str) -> Result<SecretString, VaultError> {
        self.service
            .unlock(&provider(provider_id), &secret(password))
            .await
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn sqlite_harness_round_trips() {
        let harness = TestHarness::builder().build().await.unwrap();
        harness.save("openai", TEST_OPENAI_KEY).await.unwrap();
        harness.service.lock_all().await;

        let key = harness.unlock("openai", TEST_PASSWORD).await.unwrap();
        assert_eq!(key.expose_secret(), TEST_OPENAI_KEY);
        assert!(harness.sqlite.is_some());
    }

    #[tokio::test]
    async fn memory_harness_round_trips() {
        let harness = TestHarness::builder().in_memory().build().await.unwrap();
        harness.save("anthropic", TEST_ANTHROPIC_KEY).await.unwrap();
        harness.service.lock_all().await;

        let key = harness.unlock("anthropic", TEST_PASSWORD).await.unwrap();
        assert_eq!(key.expose_secret(), TEST_ANTHROPIC_KEY);
        assert!(harness.memory.is_some());
    }

    #[tokio::test]
    async fn harnesses_are_isolated() {
        let h1 = TestHarness::builder().build().await.unwrap();
        let h2 = TestHarness::builder().build().await.unwrap();
        h1.save("openai", TEST_OPENAI_KEY).await.unwrap();

        assert!(h1.service.has_key(&provider("openai")).await.unwrap());
        assert!(!h2.service.has_key(&provider("openai")).await.unwrap());
    }

    #[tokio::test]
    async fn builder_options_reach_the_service() {
        let session = SessionPolicy::new(Duration::from_secs(120), None);
        let harness = TestHarness::builder()
            .in_memory()
            .with_session(session)
            .with_lockout(Duration::from_secs(5))
            .build()
            .await
            .unwrap();
        assert_eq!(*harness.service.session_policy(), session);
        assert_eq!(*harness.service.kdf_params(), fast_kdf());
    }
}
