// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory store with failure injection.
//!
//! `MemoryStore` implements both `SecretStore` and `RateLimitStore` so vault
//! tests can run without SQLite and can simulate an unreachable backend.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use keylock_core::{
    EncryptedRecord, KeylockError, ProviderId, RateLimitRecord, RateLimitStore, RecordMetadata,
    SecretStore,
};

#[derive(Debug, Default)]
struct Tables {
    records: BTreeMap<ProviderId, EncryptedRecord>,
    rate_limits: BTreeMap<ProviderId, RateLimitRecord>,
}

/// A store that keeps everything in process memory.
///
/// Clones share state. While [`MemoryStore::set_failing`] is on, every call
/// returns a storage error.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    failing: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of store calls made so far, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Overwrite a stored record in place, bypassing upsert rules.
    pub async fn tamper<F>(&self, provider: &ProviderId, edit: F) -> bool
    where
        F: FnOnce(&mut EncryptedRecord),
    {
        match self.tables.lock().await.records.get_mut(provider) {
            Some(record) => {
                edit(record);
                true
            }
            None => false,
        }
    }

    fn enter(&self) -> Result<(), KeylockError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(KeylockError::storage(std::io::Error::other(
                "injected storage failure",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn put(&self, record: &EncryptedRecord) -> Result<(), KeylockError> {
        self.enter()?;
        let mut tables = self.tables.lock().await;
        let mut record = record.clone();
        if let Some(existing) = tables.records.get(&record.provider) {
            record.created_at = existing.created_at;
        }
        tables.records.insert(record.provider.clone(), record);
        Ok(())
    }

    async fn get(&self, provider: &ProviderId) -> Result<Option<EncryptedRecord>, KeylockError> {
        self.enter()?;
        Ok(self.tables.lock().await.records.get(provider).cloned())
    }

    async fn delete(&self, provider: &ProviderId) -> Result<(), KeylockError> {
        self.enter()?;
        self.tables.lock().await.records.remove(provider);
        Ok(())
    }

    async fn list_providers(&self) -> Result<Vec<RecordMetadata>, KeylockError> {
        self.enter()?;
        Ok(self
            .tables
            .lock()
            .await
            .records
            .values()
            .map(EncryptedRecord::metadata)
            .collect())
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn get_rate_limit(
        &self,
        provider: &ProviderId,
    ) -> Result<Option<RateLimitRecord>, KeylockError> {
        self.enter()?;
        Ok(self.tables.lock().await.rate_limits.get(provider).cloned())
    }

    async fn put_rate_limit(&self, record: &RateLimitRecord) -> Result<(), KeylockError> {
        self.enter()?;
        self.tables
            .lock()
            .await
            .rate_limits
            .insert(record.provider.clone(), record.clone());
        Ok(())
    }

    async fn clear_rate_limit(&self, provider: &ProviderId) -> Result<(), KeylockError> {
        self.enter()?;
        self.tables.lock().await.rate_limits.remove(provider);
        Ok(())
    }
}
