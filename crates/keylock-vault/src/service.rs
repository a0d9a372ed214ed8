// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The vault service: save, unlock, lock, delete, and re-key API keys.
//!
//! Each provider moves through three states:
//!
//! ```text
//! NoKey --save--> Unlocked --lock/expire--> Locked --unlock--> Unlocked
//!   ^                 |                        |
//!   +------delete-----+------------------------+
//! ```
//!
//! Decrypted keys live only in an in-memory cache. Operations on the same
//! provider are serialized through a per-provider async mutex so counter
//! updates and cache writes never interleave; different providers proceed in
//! parallel.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use keylock_config::KeylockConfig;
use keylock_core::{Clock, KdfParams, ProviderId, RateLimitStore, SecretStore, SystemClock};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use strum::Display;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::{self, CryptoError, SealedSecret};
use crate::error::VaultError;
use crate::rate_limit::RateLimiter;
use crate::session::{SessionPolicy, UnlockedEntry};
use crate::validator::{mask_api_key, validate_api_key, validate_password};

/// Tunables for a [`VaultService`].
#[derive(Debug, Clone)]
pub struct VaultOptions {
    /// Work factors for newly sealed records.
    pub kdf: KdfParams,
    pub session: SessionPolicy,
    pub lockout: Duration,
    pub clock: Arc<dyn Clock>,
}

impl VaultOptions {
    pub fn from_config(config: &KeylockConfig) -> Self {
        Self {
            kdf: KdfParams::argon2id(
                config.vault.kdf_memory_cost,
                config.vault.kdf_iterations,
                config.vault.kdf_parallelism,
            ),
            session: SessionPolicy::from(&config.session),
            lockout: config.rate_limit.lockout_duration(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for VaultOptions {
    fn default() -> Self {
        Self::from_config(&KeylockConfig::default())
    }
}

/// Input to [`VaultService::save_key`].
#[derive(Debug)]
pub struct SaveKeyRequest {
    pub provider: ProviderId,
    pub api_key: SecretString,
    pub password: SecretString,
    pub confirm_password: SecretString,
}

/// Input to [`VaultService::change_password`].
#[derive(Debug)]
pub struct ChangePasswordRequest {
    pub provider: ProviderId,
    pub old_password: SecretString,
    pub new_password: SecretString,
    pub confirm_new_password: SecretString,
}

/// Lifecycle state of one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    NoKey,
    Locked,
    Unlocked,
}

/// Listing entry. Never carries key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub provider: ProviderId,
    pub is_unlocked: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Orchestrates validation, encryption, persistence, rate limiting, and the
/// unlocked-key cache.
pub struct VaultService {
    secrets: Arc<dyn SecretStore>,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    kdf: KdfParams,
    policy: SessionPolicy,
    cache: DashMap<ProviderId, UnlockedEntry>,
    provider_locks: DashMap<ProviderId, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for VaultService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultService")
            .field("kdf", &self.kdf)
            .field("policy", &self.policy)
            .field("unlocked", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl VaultService {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        rate_limits: Arc<dyn RateLimitStore>,
        options: VaultOptions,
    ) -> Self {
        let limiter = RateLimiter::new(rate_limits, Arc::clone(&options.clock), options.lockout);
        Self {
            secrets,
            limiter,
            clock: options.clock,
            kdf: options.kdf,
            policy: options.session,
            cache: DashMap::new(),
            provider_locks: DashMap::new(),
        }
    }

    pub fn kdf_params(&self) -> &KdfParams {
        &self.kdf
    }

    pub fn session_policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Validate, encrypt, and persist an API key, replacing any existing record.
    ///
    /// Checks run in order: confirmation, password strength, key format. The
    /// provider ends up unlocked. The rate limiter is not consulted.
    pub async fn save_key(&self, request: SaveKeyRequest) -> Result<(), VaultError> {
        let SaveKeyRequest {
            provider,
            api_key,
            password,
            confirm_password,
        } = request;

        if !secrets_match(&password, &confirm_password) {
            return Err(VaultError::PasswordsMismatch);
        }
        let strength = validate_password(password.expose_secret());
        if !strength.valid {
            return Err(VaultError::InvalidPassword {
                violations: strength.errors,
            });
        }
        if !validate_api_key(&provider, api_key.expose_secret()) {
            return Err(VaultError::InvalidApiKey { provider });
        }

        let _guard = self.lock_provider(&provider).await;

        let sealed = self.seal(&provider, &api_key, &password).await?;
        let now = self.clock.now_ms();
        self.secrets
            .put(&sealed.into_record(provider.clone(), now, now))
            .await?;
        self.cache
            .insert(provider.clone(), UnlockedEntry::new(api_key, now, &self.policy));

        info!(provider = %provider, "API key saved");
        Ok(())
    }

    /// Return the plaintext key, decrypting it with `password` if the provider
    /// is not already unlocked.
    pub async fn unlock(
        &self,
        provider: &ProviderId,
        password: &SecretString,
    ) -> Result<SecretString, VaultError> {
        let _guard = self.lock_provider(provider).await;

        let now = self.clock.now_ms();
        if let Some(key) = self.touch_cached(provider, now) {
            debug!(provider = %provider, "unlock served from session cache");
            return Ok(key);
        }

        let key = self.verify_password(provider, password).await?;
        self.cache_key(provider, &key);
        info!(provider = %provider, "provider unlocked");
        Ok(key)
    }

    /// Drop the cached key for one provider. Idempotent.
    pub async fn lock(&self, provider: &ProviderId) {
        let _guard = self.lock_provider(provider).await;
        if self.cache.remove(provider).is_some() {
            info!(provider = %provider, "provider locked");
        }
    }

    /// Drop every cached key.
    ///
    /// Each provider's lock is taken in turn, so an unlock already in flight
    /// finishes before its entry is removed.
    pub async fn lock_all(&self) {
        let mut providers: Vec<ProviderId> =
            self.cache.iter().map(|entry| entry.key().clone()).collect();
        providers.extend(self.provider_locks.iter().map(|entry| entry.key().clone()));
        providers.sort();
        providers.dedup();

        let mut count = 0usize;
        for provider in providers {
            let _guard = self.lock_provider(&provider).await;
            if self.cache.remove(&provider).is_some() {
                count += 1;
            }
        }
        if count > 0 {
            info!(count, "all providers locked");
        }
    }

    /// Remove the stored record and any cached key. Rate-limit history is kept.
    pub async fn delete_key(&self, provider: &ProviderId) -> Result<(), VaultError> {
        let _guard = self.lock_provider(provider).await;
        self.secrets.delete(provider).await?;
        self.cache.remove(provider);
        info!(provider = %provider, "API key deleted");
        Ok(())
    }

    /// Re-encrypt the stored key under a new password.
    ///
    /// The old password is always checked against the stored record, through
    /// the rate limiter, even while the provider is unlocked. On success the
    /// record gets a fresh salt and nonce and the provider stays unlocked.
    pub async fn change_password(&self, request: ChangePasswordRequest) -> Result<(), VaultError> {
        let ChangePasswordRequest {
            provider,
            old_password,
            new_password,
            confirm_new_password,
        } = request;

        let _guard = self.lock_provider(&provider).await;

        let key = self.verify_password(&provider, &old_password).await?;
        self.cache_key(&provider, &key);

        if !secrets_match(&new_password, &confirm_new_password) {
            return Err(VaultError::PasswordsMismatch);
        }
        let strength = validate_password(new_password.expose_secret());
        if !strength.valid {
            return Err(VaultError::InvalidPassword {
                violations: strength.errors,
            });
        }

        let sealed = self.seal(&provider, &key, &new_password).await?;
        let now = self.clock.now_ms();
        self.secrets
            .put(&sealed.into_record(provider.clone(), now, now))
            .await?;
        self.cache_key(&provider, &key);

        info!(provider = %provider, "password changed");
        Ok(())
    }

    /// Whether a live cached key exists. Does not count as activity.
    pub fn is_unlocked(&self, provider: &ProviderId) -> bool {
        let now = self.clock.now_ms();
        self.cache
            .get(provider)
            .is_some_and(|entry| entry.is_live(now, &self.policy))
    }

    /// Whether an encrypted record exists, readable or not.
    pub async fn has_key(&self, provider: &ProviderId) -> Result<bool, VaultError> {
        match self.secrets.get(provider).await {
            Ok(record) => Ok(record.is_some()),
            Err(keylock_core::KeylockError::CorruptRecord { .. }) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// The cached key if the provider is unlocked. Does not count as activity.
    pub fn get_unlocked_key(&self, provider: &ProviderId) -> Option<SecretString> {
        let now = self.clock.now_ms();
        self.cache
            .get(provider)
            .filter(|entry| entry.is_live(now, &self.policy))
            .map(|entry| entry.secret())
    }

    /// Display-safe form of the unlocked key.
    pub fn masked_key(&self, provider: &ProviderId) -> Option<String> {
        self.get_unlocked_key(provider)
            .map(|key| mask_api_key(key.expose_secret()))
    }

    /// Stored providers with their lock state, sorted by provider.
    pub async fn list_providers(&self) -> Result<Vec<ProviderStatus>, VaultError> {
        let records = self.secrets.list_providers().await?;
        Ok(records
            .into_iter()
            .map(|meta| ProviderStatus {
                is_unlocked: self.is_unlocked(&meta.provider),
                provider: meta.provider,
                created_at: meta.created_at,
                updated_at: meta.updated_at,
            })
            .collect())
    }

    pub async fn key_state(&self, provider: &ProviderId) -> Result<KeyState, VaultError> {
        if !self.has_key(provider).await? {
            return Ok(KeyState::NoKey);
        }
        Ok(if self.is_unlocked(provider) {
            KeyState::Unlocked
        } else {
            KeyState::Locked
        })
    }

    /// Record use of an unlocked key, extending its inactivity window.
    ///
    /// Returns `false` if the provider is not unlocked.
    pub fn record_activity(&self, provider: &ProviderId) -> bool {
        let now = self.clock.now_ms();
        match self.cache.get_mut(provider) {
            Some(mut entry) if entry.is_live(now, &self.policy) => {
                entry.touch(now);
                true
            }
            _ => false,
        }
    }

    /// Evict every expired cache entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.cache.len();
        self.cache.retain(|_, entry| entry.is_live(now, &self.policy));
        let evicted = before.saturating_sub(self.cache.len());
        if evicted > 0 {
            debug!(evicted, "expired sessions evicted");
        }
        evicted
    }

    /// Run [`Self::sweep_expired`] every `interval` until `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        service.sweep_expired();
                    }
                }
            }
            debug!("session sweeper stopped");
        })
    }

    /// Serialize operations on one provider until the guard drops.
    async fn lock_provider(&self, provider: &ProviderId) -> ProviderGuard<'_> {
        let lock = Arc::clone(self.provider_locks.entry(provider.clone()).or_default().value());
        ProviderGuard {
            locks: &self.provider_locks,
            provider: provider.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Live cached key, marking activity. An expired entry is evicted.
    fn touch_cached(&self, provider: &ProviderId, now: i64) -> Option<SecretString> {
        let live = {
            let mut entry = self.cache.get_mut(provider)?;
            if entry.is_live(now, &self.policy) {
                entry.touch(now);
                Some(entry.secret())
            } else {
                None
            }
        };
        if live.is_none() {
            self.cache.remove(provider);
        }
        live
    }

    fn cache_key(&self, provider: &ProviderId, key: &SecretString) {
        let now = self.clock.now_ms();
        let copy = SecretString::from(key.expose_secret().to_owned());
        self.cache
            .insert(provider.clone(), UnlockedEntry::new(copy, now, &self.policy));
    }

    /// Decrypt the stored record under the rate limiter.
    ///
    /// Callers must hold the provider lock.
    async fn verify_password(
        &self,
        provider: &ProviderId,
        password: &SecretString,
    ) -> Result<SecretString, VaultError> {
        let record = match self.secrets.get(provider).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                return Err(VaultError::KeyNotFound {
                    provider: provider.clone(),
                });
            }
            Err(keylock_core::KeylockError::CorruptRecord { .. }) => {
                warn!(provider = %provider, "stored record is unreadable");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let status = self.limiter.check_limit(provider).await?;
        if !status.allowed {
            return Err(VaultError::RateLimited {
                retry_after_ms: status.retry_after_ms.unwrap_or(0),
            });
        }

        let opened = match record {
            Some(record) => {
                let password = SecretString::from(password.expose_secret().to_owned());
                tokio::task::spawn_blocking(move || crypto::decrypt(&record, &password))
                    .await
                    .map_err(|e| VaultError::Internal(format!("decryption task failed: {e}")))?
            }
            None => Err(CryptoError::AuthenticationFailure),
        };

        match opened {
            Ok(key) => {
                self.limiter.record_success(provider).await?;
                Ok(key)
            }
            Err(_) => {
                let after = self.limiter.record_failure(provider).await?;
                warn!(
                    provider = %provider,
                    attempts_remaining = after.attempts_remaining,
                    "unlock failed"
                );
                Err(VaultError::WrongPassword)
            }
        }
    }

    async fn seal(
        &self,
        provider: &ProviderId,
        plaintext: &SecretString,
        password: &SecretString,
    ) -> Result<SealedSecret, VaultError> {
        let plaintext = Zeroizing::new(plaintext.expose_secret().as_bytes().to_vec());
        let password = SecretString::from(password.expose_secret().to_owned());
        let aad = provider.as_str().as_bytes().to_vec();
        let params = self.kdf;
        tokio::task::spawn_blocking(move || crypto::encrypt(&plaintext, &password, &aad, &params))
            .await
            .map_err(|e| VaultError::Internal(format!("encryption task failed: {e}")))?
            .map_err(|e| VaultError::Internal(e.to_string()))
    }
}

/// Held provider lock. On drop, the map entry is removed once nobody else
/// holds or waits on it.
struct ProviderGuard<'a> {
    locks: &'a DashMap<ProviderId, Arc<Mutex<()>>>,
    provider: ProviderId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ProviderGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.provider, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Constant-time equality of two secrets.
fn secrets_match(a: &SecretString, b: &SecretString) -> bool {
    ring::constant_time::verify_slices_are_equal(
        a.expose_secret().as_bytes(),
        b.expose_secret().as_bytes(),
    )
    .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use keylock_core::{EncryptedRecord, KeylockError, ManualClock, RecordMetadata};
    use keylock_storage::{Database, SqliteStorage};
    use tempfile::TempDir;

    use crate::error::ErrorCode;
    use crate::rate_limit::MAX_ATTEMPTS;

    const OPENAI_KEY: &str = "sk-proj-abcdefghijklmnopqrstuvwxyz123456";
    const ANTHROPIC_KEY: &str = "sk-ant-REDACTED";
    const PASSWORD: &str = "StrongPassword123!";
    const NEW_PASSWORD: &str = "EvenStronger456?";

    struct Fixture {
        service: Arc<VaultService>,
        storage: SqliteStorage,
        clock: ManualClock,
        _dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");
        let storage = SqliteStorage::new(Database::open(path.to_str().unwrap()).await.unwrap());
        let clock = ManualClock::new(1_700_000_000_000);
        let options = VaultOptions {
            kdf: KdfParams::argon2id(1024, 1, 1),
            session: SessionPolicy::new(Duration::from_secs(3600), Some(Duration::from_secs(900))),
            lockout: Duration::from_secs(60),
            clock: Arc::new(clock.clone()),
        };
        let service = VaultService::new(
            Arc::new(storage.clone()),
            Arc::new(storage.clone()),
            options,
        );
        Fixture {
            service: Arc::new(service),
            storage,
            clock,
            _dir: dir,
        }
    }

    fn s(v: &str) -> SecretString {
        SecretString::from(v.to_string())
    }

    fn id(v: &str) -> ProviderId {
        v.parse().unwrap()
    }

    fn save_request(provider: &str, key: &str) -> SaveKeyRequest {
        SaveKeyRequest {
            provider: id(provider),
            api_key: s(key),
            password: s(PASSWORD),
            confirm_password: s(PASSWORD),
        }
    }

    fn change_request(old: &str, new: &str, confirm: &str) -> ChangePasswordRequest {
        ChangePasswordRequest {
            provider: id("openai"),
            old_password: s(old),
            new_password: s(new),
            confirm_new_password: s(confirm),
        }
    }

    #[tokio::test]
    async fn save_then_unlock_after_lock() {
        let f = fixture().await;
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();
        assert!(f.service.is_unlocked(&id("openai")));

        f.service.lock(&id("openai")).await;
        assert!(!f.service.is_unlocked(&id("openai")));

        let key = f.service.unlock(&id("openai"), &s(PASSWORD)).await.unwrap();
        assert_eq!(key.expose_secret(), OPENAI_KEY);
        assert!(f.service.is_unlocked(&id("openai")));
    }

    #[tokio::test]
    async fn stored_record_is_not_plaintext() {
        let f = fixture().await;
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();
        let record = f.storage.get(&id("openai")).await.unwrap().unwrap();
        assert!(!record
            .ciphertext
            .windows(OPENAI_KEY.len())
            .any(|w| w == OPENAI_KEY.as_bytes()));
        assert_eq!(record.nonce.len(), 12);
        assert_eq!(record.salt.len(), 16);
    }

    #[tokio::test]
    async fn save_validation_order() {
        let f = fixture().await;

        let mut req = save_request("openai", "not-a-key");
        req.password = s("weak");
        req.confirm_password = s("different");
        let err = f.service.save_key(req).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::PasswordsMismatch);

        let mut req = save_request("openai", "not-a-key");
        req.password = s("weak");
        req.confirm_password = s("weak");
        let err = f.service.save_key(req).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPassword);

        let err = f
            .service
            .save_key(save_request("openai", "not-a-key"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidApiKey);

        assert!(!f.service.has_key(&id("openai")).await.unwrap());
    }

    #[tokio::test]
    async fn save_rejects_key_for_wrong_provider() {
        let f = fixture().await;
        let err = f
            .service
            .save_key(save_request("anthropic", OPENAI_KEY))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::InvalidApiKey { .. }));

        for key in [ANTHROPIC_KEY, "sk-or-v1-0123456789abcdef0123456789abcdef"] {
            let err = f
                .service
                .save_key(save_request("openai", key))
                .await
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidApiKey);
        }
        assert!(!f.service.has_key(&id("openai")).await.unwrap());
    }

    #[tokio::test]
    async fn unlock_missing_provider_is_key_not_found() {
        let f = fixture().await;
        let err = f
            .service
            .unlock(&id("non-existent"), &s(PASSWORD))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::KeyNotFound);
    }

    #[tokio::test]
    async fn sixth_attempt_is_rate_limited_even_with_correct_password() {
        let f = fixture().await;
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();
        f.service.lock(&id("openai")).await;

        for _ in 0..MAX_ATTEMPTS {
            let err = f
                .service
                .unlock(&id("openai"), &s("WrongPassword123!"))
                .await
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::WrongPassword);
        }

        let err = f.service.unlock(&id("openai"), &s(PASSWORD)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RateLimited);
        assert_eq!(err.retry_after_ms(), Some(60_000));

        f.clock.advance(Duration::from_secs(60));
        let key = f.service.unlock(&id("openai"), &s(PASSWORD)).await.unwrap();
        assert_eq!(key.expose_secret(), OPENAI_KEY);
    }

    #[tokio::test]
    async fn lockout_on_one_provider_does_not_affect_another() {
        let f = fixture().await;
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();
        f.service
            .save_key(save_request("anthropic", ANTHROPIC_KEY))
            .await
            .unwrap();
        f.service.lock_all().await;

        for _ in 0..MAX_ATTEMPTS {
            let _ = f.service.unlock(&id("openai"), &s("WrongPassword123!")).await;
        }
        let err = f.service.unlock(&id("openai"), &s(PASSWORD)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RateLimited);

        let key = f
            .service
            .unlock(&id("anthropic"), &s(PASSWORD))
            .await
            .unwrap();
        assert_eq!(key.expose_secret(), ANTHROPIC_KEY);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let f = fixture().await;
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();
        f.service.lock(&id("openai")).await;

        for _ in 0..MAX_ATTEMPTS - 1 {
            let _ = f.service.unlock(&id("openai"), &s("WrongPassword123!")).await;
        }
        f.service.unlock(&id("openai"), &s(PASSWORD)).await.unwrap();
        f.service.lock(&id("openai")).await;

        for _ in 0..MAX_ATTEMPTS - 1 {
            let err = f
                .service
                .unlock(&id("openai"), &s("WrongPassword123!"))
                .await
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::WrongPassword);
        }
    }

    #[tokio::test]
    async fn unlocked_provider_skips_password_check() {
        let f = fixture().await;
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();
        let key = f
            .service
            .unlock(&id("openai"), &s("anything at all"))
            .await
            .unwrap();
        assert_eq!(key.expose_secret(), OPENAI_KEY);
        let limits = f.storage.get_rate_limit(&id("openai")).await.unwrap();
        assert!(limits.is_none());
    }

    #[tokio::test]
    async fn change_password_rotates_encryption() {
        let f = fixture().await;
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();
        let before = f.storage.get(&id("openai")).await.unwrap().unwrap();

        f.clock.advance(Duration::from_secs(5));
        f.service
            .change_password(change_request(PASSWORD, NEW_PASSWORD, NEW_PASSWORD))
            .await
            .unwrap();
        assert!(f.service.is_unlocked(&id("openai")));

        let after = f.storage.get(&id("openai")).await.unwrap().unwrap();
        assert_ne!(before.salt, after.salt);
        assert_ne!(before.nonce, after.nonce);
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.updated_at, before.updated_at + 5_000);

        f.service.lock(&id("openai")).await;
        let err = f.service.unlock(&id("openai"), &s(PASSWORD)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::WrongPassword);
        let key = f
            .service
            .unlock(&id("openai"), &s(NEW_PASSWORD))
            .await
            .unwrap();
        assert_eq!(key.expose_secret(), OPENAI_KEY);
    }

    #[tokio::test]
    async fn change_password_checks_old_password_first() {
        let f = fixture().await;
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();

        // Still unlocked, but the old password is verified against the record.
        let err = f
            .service
            .change_password(change_request("WrongPassword123!", "weak", "mismatch"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::WrongPassword);

        let err = f
            .service
            .change_password(change_request(PASSWORD, NEW_PASSWORD, "mismatch"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PasswordsMismatch);

        let err = f
            .service
            .change_password(change_request(PASSWORD, "weak", "weak"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidPassword);

        let err = f
            .service
            .change_password(ChangePasswordRequest {
                provider: id("anthropic"),
                ..change_request(PASSWORD, NEW_PASSWORD, NEW_PASSWORD)
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::KeyNotFound);
    }

    #[tokio::test]
    async fn delete_keeps_rate_limit_history() {
        let f = fixture().await;
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();
        f.service.lock(&id("openai")).await;
        let _ = f.service.unlock(&id("openai"), &s("WrongPassword123!")).await;

        f.service.delete_key(&id("openai")).await.unwrap();
        assert!(!f.service.is_unlocked(&id("openai")));
        assert_eq!(
            f.service.key_state(&id("openai")).await.unwrap(),
            KeyState::NoKey
        );
        let err = f.service.unlock(&id("openai"), &s(PASSWORD)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::KeyNotFound);

        let limits = f.storage.get_rate_limit(&id("openai")).await.unwrap().unwrap();
        assert_eq!(limits.failed_attempts, 1);
        f.service.delete_key(&id("openai")).await.unwrap();
    }

    #[tokio::test]
    async fn absolute_timeout_locks_provider() {
        let f = fixture().await;
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();

        f.clock.advance(Duration::from_secs(800));
        assert!(f.service.record_activity(&id("openai")));
        f.clock.advance(Duration::from_secs(800));
        assert!(f.service.record_activity(&id("openai")));
        f.clock.advance(Duration::from_secs(800));
        assert!(f.service.record_activity(&id("openai")));
        f.clock.advance(Duration::from_secs(800));
        assert!(f.service.is_unlocked(&id("openai")));
        f.clock.advance(Duration::from_secs(400));

        assert!(!f.service.is_unlocked(&id("openai")));
        assert!(f.service.get_unlocked_key(&id("openai")).is_none());
        assert_eq!(
            f.service.key_state(&id("openai")).await.unwrap(),
            KeyState::Locked
        );
    }

    #[tokio::test]
    async fn inactivity_locks_provider() {
        let f = fixture().await;
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();
        f.clock.advance(Duration::from_secs(899));
        assert!(f.service.get_unlocked_key(&id("openai")).is_some());
        // Reads do not count as activity.
        f.clock.advance(Duration::from_secs(1));
        assert!(!f.service.is_unlocked(&id("openai")));
        assert!(!f.service.record_activity(&id("openai")));
    }

    #[tokio::test]
    async fn expired_session_requires_password_again() {
        let f = fixture().await;
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();
        f.clock.advance(Duration::from_secs(3600));

        let err = f
            .service
            .unlock(&id("openai"), &s("WrongPassword123!"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::WrongPassword);
    }

    #[tokio::test]
    async fn sweep_evicts_only_expired() {
        let f = fixture().await;
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();
        f.clock.advance(Duration::from_secs(600));
        f.service
            .save_key(save_request("anthropic", ANTHROPIC_KEY))
            .await
            .unwrap();
        f.clock.advance(Duration::from_secs(400));

        assert_eq!(f.service.sweep_expired(), 1);
        assert!(!f.service.is_unlocked(&id("openai")));
        assert!(f.service.is_unlocked(&id("anthropic")));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_stops_on_cancel() {
        let f = fixture().await;
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();
        f.clock.advance(Duration::from_secs(3600));

        let cancel = CancellationToken::new();
        let handle = f.service.spawn_sweeper(Duration::from_secs(1), cancel.clone());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(f.service.sweep_expired(), 0);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn list_reports_lock_state_without_keys() {
        let f = fixture().await;
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();
        f.service
            .save_key(save_request("anthropic", ANTHROPIC_KEY))
            .await
            .unwrap();
        f.service.lock(&id("openai")).await;

        let listed = f.service.list_providers().await.unwrap();
        let summary: Vec<(&str, bool)> = listed
            .iter()
            .map(|p| (p.provider.as_str(), p.is_unlocked))
            .collect();
        assert_eq!(summary, [("anthropic", true), ("openai", false)]);

        let json = serde_json::to_string(&listed).unwrap();
        assert!(!json.contains(OPENAI_KEY));
        assert!(!json.contains(ANTHROPIC_KEY));
    }

    #[tokio::test]
    async fn masked_key_hides_secret() {
        let f = fixture().await;
        assert!(f.service.masked_key(&id("openai")).is_none());
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();
        let masked = f.service.masked_key(&id("openai")).unwrap();
        assert_eq!(masked, "sk-proj****3456");
    }

    #[tokio::test]
    async fn overwrite_replaces_key_and_keeps_created_at() {
        let f = fixture().await;
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();
        let created = f.storage.get(&id("openai")).await.unwrap().unwrap().created_at;

        f.clock.advance(Duration::from_secs(10));
        let replacement = "sk-proj-zyxwvutsrqponmlkjihgfedcba654321";
        f.service
            .save_key(save_request("openai", replacement))
            .await
            .unwrap();
        f.service.lock(&id("openai")).await;

        let key = f.service.unlock(&id("openai"), &s(PASSWORD)).await.unwrap();
        assert_eq!(key.expose_secret(), replacement);
        let record = f.storage.get(&id("openai")).await.unwrap().unwrap();
        assert_eq!(record.created_at, created);
    }

    #[tokio::test]
    async fn concurrent_unlocks_of_one_provider_are_consistent() {
        let f = fixture().await;
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();
        f.service.lock(&id("openai")).await;

        let mut handles = Vec::new();
        for _ in 0..4 {
            let service = Arc::clone(&f.service);
            handles.push(tokio::spawn(async move {
                service
                    .unlock(&id("openai"), &s("WrongPassword123!"))
                    .await
                    .map(|_| ())
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }
        let limits = f.storage.get_rate_limit(&id("openai")).await.unwrap().unwrap();
        assert_eq!(limits.failed_attempts, 4);
    }

    #[tokio::test]
    async fn cached_key_reads_return_the_secret() {
        let f = fixture().await;
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();

        let cached = f.service.get_unlocked_key(&id("openai")).unwrap();
        assert_eq!(cached.expose_secret(), OPENAI_KEY);
        let again = f.service.unlock(&id("openai"), &s(PASSWORD)).await.unwrap();
        assert_eq!(again.expose_secret(), OPENAI_KEY);
    }

    #[tokio::test]
    async fn provider_locks_are_released_after_use() {
        let f = fixture().await;
        for i in 0..100 {
            let absent = id(&format!("absent-{i}"));
            f.service.lock(&absent).await;
            let _ = f.service.unlock(&absent, &s(PASSWORD)).await;
            f.service.delete_key(&absent).await.unwrap();
        }
        assert!(f.service.provider_locks.is_empty());

        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();
        f.service.lock(&id("openai")).await;
        f.service.unlock(&id("openai"), &s(PASSWORD)).await.unwrap();
        f.service.lock_all().await;
        assert!(f.service.provider_locks.is_empty());
    }

    #[tokio::test]
    async fn lock_all_waits_for_in_flight_unlock() {
        let f = fixture().await;
        f.service.save_key(save_request("openai", OPENAI_KEY)).await.unwrap();

        // Stand in for an unlock that is past its cache check.
        let guard = f.service.lock_provider(&id("openai")).await;
        let service = Arc::clone(&f.service);
        let locking = tokio::spawn(async move { service.lock_all().await });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!locking.is_finished());

        f.service.cache_key(&id("openai"), &s(OPENAI_KEY));
        drop(guard);
        locking.await.unwrap();

        assert!(!f.service.is_unlocked(&id("openai")));
        assert!(f.service.provider_locks.is_empty());
    }

    /// Store whose reads always report a damaged record.
    struct CorruptStore;

    #[async_trait::async_trait]
    impl SecretStore for CorruptStore {
        async fn put(&self, _record: &EncryptedRecord) -> Result<(), KeylockError> {
            Ok(())
        }
        async fn get(&self, provider: &ProviderId) -> Result<Option<EncryptedRecord>, KeylockError> {
            Err(KeylockError::CorruptRecord {
                provider: provider.to_string(),
            })
        }
        async fn delete(&self, _provider: &ProviderId) -> Result<(), KeylockError> {
            Ok(())
        }
        async fn list_providers(&self) -> Result<Vec<RecordMetadata>, KeylockError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn corrupt_record_counts_as_wrong_password() {
        let f = fixture().await;
        let service = VaultService::new(
            Arc::new(CorruptStore),
            Arc::new(f.storage.clone()),
            VaultOptions::default().with_clock(Arc::new(f.clock.clone())),
        );
        let err = service.unlock(&id("openai"), &s(PASSWORD)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::WrongPassword);
        assert!(service.has_key(&id("openai")).await.unwrap());

        let limits = f.storage.get_rate_limit(&id("openai")).await.unwrap().unwrap();
        assert_eq!(limits.failed_attempts, 1);
    }
}
