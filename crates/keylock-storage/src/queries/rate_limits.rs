// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rate-limit record operations.

use keylock_core::{KeylockError, ProviderId, RateLimitRecord};
use rusqlite::params;

use crate::database::{map_tr_err, Database};

/// Get the rate-limit record for a provider.
pub async fn get_rate_limit(
    db: &Database,
    provider: &ProviderId,
) -> Result<Option<RateLimitRecord>, KeylockError> {
    let key = provider.as_str().to_string();
    let row = db
        .connection()
        .call(move |conn| -> Result<Option<(u32, Option<i64>)>, rusqlite::Error> {
            let result = conn.query_row(
                "SELECT failed_attempts, locked_until FROM rate_limits WHERE provider = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            );
            match result {
                Ok(row) => Ok(Some(row)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)?;

    Ok(row.map(|(failed_attempts, locked_until)| RateLimitRecord {
        provider: provider.clone(),
        failed_attempts,
        locked_until,
    }))
}

/// Insert or replace the rate-limit record for a provider.
pub async fn put_rate_limit(db: &Database, record: &RateLimitRecord) -> Result<(), KeylockError> {
    let record = record.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO rate_limits (provider, failed_attempts, locked_until)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(provider) DO UPDATE SET
                     failed_attempts = excluded.failed_attempts,
                     locked_until = excluded.locked_until",
                params![record.provider.as_str(), record.failed_attempts, record.locked_until],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Remove the rate-limit record for a provider.
pub async fn clear_rate_limit(db: &Database, provider: &ProviderId) -> Result<(), KeylockError> {
    let key = provider.as_str().to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute("DELETE FROM rate_limits WHERE provider = ?1", params![key])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
