// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-provider failed-attempt counting and lockout.
//!
//! After [`MAX_ATTEMPTS`] consecutive failures a provider is locked for a
//! fixed window. An elapsed lockout is forgotten the next time the record is
//! observed, restoring the full attempt budget.

use std::sync::Arc;
use std::time::Duration;

use keylock_core::clock::duration_ms;
use keylock_core::{Clock, KeylockError, ProviderId, RateLimitRecord, RateLimitStore};
use serde::Serialize;
use tracing::{debug, warn};

/// Consecutive failures allowed before a lockout.
pub const MAX_ATTEMPTS: u32 = 5;

/// Default lockout window.
pub const DEFAULT_LOCKOUT: Duration = Duration::from_secs(60);

/// Whether an unlock attempt may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitStatus {
    pub allowed: bool,
    pub attempts_remaining: u32,
    /// Time until the lockout ends. Only set while locked.
    pub retry_after_ms: Option<u64>,
}

impl LimitStatus {
    fn open(failed_attempts: u32) -> Self {
        Self {
            allowed: true,
            attempts_remaining: MAX_ATTEMPTS.saturating_sub(failed_attempts),
            retry_after_ms: None,
        }
    }

    fn locked(until: i64, now: i64) -> Self {
        Self {
            allowed: false,
            attempts_remaining: 0,
            retry_after_ms: Some(u64::try_from(until - now).unwrap_or(0)),
        }
    }
}

/// Rate limiter over a persistent [`RateLimitStore`].
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    lockout: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("clock", &self.clock)
            .field("lockout", &self.lockout)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>, lockout: Duration) -> Self {
        Self {
            store,
            clock,
            lockout,
        }
    }

    pub fn lockout(&self) -> Duration {
        self.lockout
    }

    /// Report whether an attempt is allowed, resetting an elapsed lockout.
    pub async fn check_limit(&self, provider: &ProviderId) -> Result<LimitStatus, KeylockError> {
        let now = self.clock.now_ms();
        let record = self.load_current(provider, now).await?;
        Ok(match record.locked_until {
            Some(until) => LimitStatus::locked(until, now),
            None => LimitStatus::open(record.failed_attempts),
        })
    }

    /// Count a failed attempt, locking the provider when the budget runs out.
    pub async fn record_failure(&self, provider: &ProviderId) -> Result<LimitStatus, KeylockError> {
        let now = self.clock.now_ms();
        let mut record = self.load_current(provider, now).await?;
        if let Some(until) = record.locked_until {
            return Ok(LimitStatus::locked(until, now));
        }

        record.failed_attempts = record.failed_attempts.saturating_add(1);
        let status = if record.failed_attempts >= MAX_ATTEMPTS {
            let until = now.saturating_add(duration_ms(self.lockout));
            record.locked_until = Some(until);
            warn!(
                provider = %provider,
                lockout_secs = self.lockout.as_secs(),
                "provider locked after repeated failed unlock attempts"
            );
            LimitStatus::locked(until, now)
        } else {
            LimitStatus::open(record.failed_attempts)
        };
        self.store.put_rate_limit(&record).await?;
        Ok(status)
    }

    /// Reset the counter after a successful unlock.
    pub async fn record_success(&self, provider: &ProviderId) -> Result<(), KeylockError> {
        let existing = self.store.get_rate_limit(provider).await?;
        if existing.is_some_and(|r| r.failed_attempts > 0 || r.locked_until.is_some()) {
            self.store
                .put_rate_limit(&RateLimitRecord::new(provider.clone()))
                .await?;
            debug!(provider = %provider, "failed-attempt counter reset");
        }
        Ok(())
    }

    /// Load the record, clearing a lockout whose window has passed.
    async fn load_current(
        &self,
        provider: &ProviderId,
        now: i64,
    ) -> Result<RateLimitRecord, KeylockError> {
        let record = self
            .store
            .get_rate_limit(provider)
            .await?
            .unwrap_or_else(|| RateLimitRecord::new(provider.clone()));
        match record.locked_until {
            Some(until) if until <= now => {
                let reset = RateLimitRecord::new(provider.clone());
                self.store.put_rate_limit(&reset).await?;
                debug!(provider = %provider, "lockout expired");
                Ok(reset)
            }
            _ => Ok(record),
        }
    }
}
