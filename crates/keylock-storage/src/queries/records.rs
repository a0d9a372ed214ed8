// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Encrypted record CRUD operations.

use keylock_core::{EncryptedRecord, KdfParams, KeylockError, ProviderId, RecordMetadata};
use rusqlite::params;

use crate::database::{map_tr_err, Database};

/// Raw column values of one `encrypted_records` row.
type RecordRow = (String, Vec<u8>, Vec<u8>, Vec<u8>, String, i64, i64);

/// Insert a record, or replace the existing one for the same provider.
///
/// `created_at` of an existing row is preserved.
pub async fn put_record(db: &Database, record: &EncryptedRecord) -> Result<(), KeylockError> {
    let kdf_params = serde_json::to_string(&record.kdf_params)
        .map_err(|e| KeylockError::Internal(format!("failed to encode KDF params: {e}")))?;
    let record = record.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO encrypted_records
                     (provider, ciphertext, nonce, salt, kdf_params, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(provider) DO UPDATE SET
                     ciphertext = excluded.ciphertext,
                     nonce = excluded.nonce,
                     salt = excluded.salt,
                     kdf_params = excluded.kdf_params,
                     updated_at = excluded.updated_at",
                params![
                    record.provider.as_str(),
                    record.ciphertext,
                    record.nonce,
                    record.salt,
                    kdf_params,
                    record.created_at,
                    record.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get the record for a provider.
pub async fn get_record(
    db: &Database,
    provider: &ProviderId,
) -> Result<Option<EncryptedRecord>, KeylockError> {
    let key = provider.as_str().to_string();
    let row = db
        .connection()
        .call(move |conn| -> Result<Option<RecordRow>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT provider, ciphertext, nonce, salt, kdf_params, created_at, updated_at
                 FROM encrypted_records WHERE provider = ?1",
            )?;
            let result = stmt.query_row(params![key], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            });
            match result {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)?;

    row.map(decode_record).transpose()
}

fn decode_record(row: RecordRow) -> Result<EncryptedRecord, KeylockError> {
    let (provider, ciphertext, nonce, salt, kdf_params, created_at, updated_at) = row;
    let corrupt = || KeylockError::CorruptRecord {
        provider: provider.clone(),
    };
    let kdf_params: KdfParams = serde_json::from_str(&kdf_params).map_err(|_| corrupt())?;
    let provider_id = ProviderId::new(provider.as_str()).map_err(|_| corrupt())?;
    Ok(EncryptedRecord {
        provider: provider_id,
        ciphertext,
        nonce,
        salt,
        kdf_params,
        created_at,
        updated_at,
    })
}

/// Delete the record for a provider. Returns whether a row was removed.
pub async fn delete_record(db: &Database, provider: &ProviderId) -> Result<bool, KeylockError> {
    let key = provider.as_str().to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let removed = conn.execute(
                "DELETE FROM encrypted_records WHERE provider = ?1",
                params![key],
            )?;
            Ok(removed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// List record metadata ordered by provider.
///
/// Rows whose provider column no longer validates are skipped.
pub async fn list_record_metadata(db: &Database) -> Result<Vec<RecordMetadata>, KeylockError> {
    let rows = db
        .connection()
        .call(|conn| -> Result<Vec<(String, i64, i64)>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT provider, created_at, updated_at
                 FROM encrypted_records ORDER BY provider",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)?;

    Ok(rows
        .into_iter()
        .filter_map(|(provider, created_at, updated_at)| {
            ProviderId::new(provider).ok().map(|provider| RecordMetadata {
                provider,
                created_at,
                updated_at,
            })
        })
        .collect())
}
