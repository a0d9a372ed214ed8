// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the `SecretStore` and `RateLimitStore` traits.

use async_trait::async_trait;
use tracing::debug;

use keylock_config::model::StorageConfig;
use keylock_core::{
    EncryptedRecord, KeylockError, ProviderId, RateLimitRecord, RateLimitStore, RecordMetadata,
    SecretStore,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed store for encrypted records and rate-limit counters.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules.
/// Cloning is cheap and shares the single writer connection.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    db: Database,
}

impl SqliteStorage {
    /// Wrap an already opened database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open the database named by the storage config and run migrations.
    pub async fn open(config: &StorageConfig) -> Result<Self, KeylockError> {
        let db = Database::from_config(config).await?;
        debug!(path = %config.database_path, "SQLite storage initialized");
        Ok(Self { db })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), KeylockError> {
        self.db.close().await
    }
}

#[async_trait]
impl SecretStore for SqliteStorage {
    async fn put(&self, record: &EncryptedRecord) -> Result<(), KeylockError> {
        queries::records::put_record(&self.db, record).await
    }

    async fn get(&self, provider: &ProviderId) -> Result<Option<EncryptedRecord>, KeylockError> {
        queries::records::get_record(&self.db, provider).await
    }

    async fn delete(&self, provider: &ProviderId) -> Result<(), KeylockError> {
        let removed = queries::records::delete_record(&self.db, provider).await?;
        debug!(provider = %provider, removed, "encrypted record delete");
        Ok(())
    }

    async fn list_providers(&self) -> Result<Vec<RecordMetadata>, KeylockError> {
        queries::records::list_record_metadata(&self.db).await
    }
}

#[async_trait]
impl RateLimitStore for SqliteStorage {
    async fn get_rate_limit(
        &self,
        provider: &ProviderId,
    ) -> Result<Option<RateLimitRecord>, KeylockError> {
        queries::rate_limits::get_rate_limit(&self.db, provider).await
    }

    async fn put_rate_limit(&self, record: &RateLimitRecord) -> Result<(), KeylockError> {
        queries::rate_limits::put_rate_limit(&self.db, record).await
    }

    async fn clear_rate_limit(&self, provider: &ProviderId) -> Result<(), KeylockError> {
        queries::rate_limits::clear_rate_limit(&self.db, provider).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keylock_core::KdfParams;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    fn make_record(provider: &str) -> EncryptedRecord {
        EncryptedRecord {
            provider: provider.parse().unwrap(),
            ciphertext: vec![0xAB; 40],
            nonce: vec![1; 12],
            salt: vec![2; 16],
            kdf_params: KdfParams::argon2id(32768, 2, 1),
            created_at: 10,
            updated_at: 10,
        }
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("vault.db");
        let config = make_config(db_path.to_str().unwrap());

        let storage = SqliteStorage::open(&config).await.unwrap();
        let record = make_record("anthropic");
        storage.put(&record).await.unwrap();
        storage.close().await.unwrap();

        let reopened = SqliteStorage::open(&config).await.unwrap();
        assert_eq!(reopened.get(&record.provider).await.unwrap(), Some(record));
        reopened.close().await.unwrap();
    }

    #[tokio::test]
    async fn secret_and_rate_limit_lifecycles_are_independent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("vault.db");
        let storage = SqliteStorage::open(&make_config(db_path.to_str().unwrap()))
            .await
            .unwrap();

        let record = make_record("openai");
        storage.put(&record).await.unwrap();
        storage
            .put_rate_limit(&RateLimitRecord {
                provider: record.provider.clone(),
                failed_attempts: 2,
                locked_until: None,
            })
            .await
            .unwrap();

        storage.delete(&record.provider).await.unwrap();
        storage.delete(&record.provider).await.unwrap();

        assert!(storage.get(&record.provider).await.unwrap().is_none());
        let limits = storage.get_rate_limit(&record.provider).await.unwrap().unwrap();
        assert_eq!(limits.failed_attempts, 2);
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_providers_reports_metadata_only() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("vault.db");
        let storage = SqliteStorage::open(&make_config(db_path.to_str().unwrap()))
            .await
            .unwrap();
        storage.put(&make_record("openai")).await.unwrap();

        let listed = storage.list_providers().await.unwrap();
        assert_eq!(listed, vec![make_record("openai").metadata()]);
        storage.close().await.unwrap();
    }
}
