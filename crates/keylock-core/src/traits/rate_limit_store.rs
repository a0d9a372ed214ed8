// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence for failed-unlock counters and lockout deadlines.

use async_trait::async_trait;

use crate::error::KeylockError;
use crate::types::{ProviderId, RateLimitRecord};

/// Store of per-provider rate-limit records.
///
/// Lifecycles are independent of [`crate::traits::SecretStore`] records.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn get_rate_limit(
        &self,
        provider: &ProviderId,
    ) -> Result<Option<RateLimitRecord>, KeylockError>;

    /// Insert or replace the record for `record.provider`.
    async fn put_rate_limit(&self, record: &RateLimitRecord) -> Result<(), KeylockError>;

    /// Remove the record for a provider; idempotent.
    async fn clear_rate_limit(&self, provider: &ProviderId) -> Result<(), KeylockError>;
}
