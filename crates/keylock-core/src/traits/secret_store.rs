// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable provider -> encrypted record mapping.

use async_trait::async_trait;

use crate::error::KeylockError;
use crate::types::{EncryptedRecord, ProviderId, RecordMetadata};

/// Store of encrypted API-key records, at most one per provider.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Insert or replace the record for `record.provider`.
    ///
    /// On replace, the stored `created_at` is kept and `updated_at` is taken
    /// from the new record.
    async fn put(&self, record: &EncryptedRecord) -> Result<(), KeylockError>;

    /// Fetch the record for a provider.
    ///
    /// Returns [`KeylockError::CorruptRecord`] when a row exists but cannot be
    /// decoded.
    async fn get(&self, provider: &ProviderId) -> Result<Option<EncryptedRecord>, KeylockError>;

    /// Remove the record for a provider. Removing a missing record is not an error.
    async fn delete(&self, provider: &ProviderId) -> Result<(), KeylockError>;

    /// Metadata for every stored record, sorted by provider.
    async fn list_providers(&self) -> Result<Vec<RecordMetadata>, KeylockError>;
}
