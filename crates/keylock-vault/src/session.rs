// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Unlocked-session lifetime rules.

use std::time::Duration;

use keylock_config::model::SessionConfig;
use keylock_core::clock::duration_ms;
use secrecy::{ExposeSecret, SecretString};

/// How long an unlocked key stays usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Hard cap measured from the unlock.
    pub absolute_timeout: Duration,
    /// Idle limit measured from the last recorded activity. `None` disables it.
    pub inactivity_timeout: Option<Duration>,
}

impl SessionPolicy {
    pub fn new(absolute_timeout: Duration, inactivity_timeout: Option<Duration>) -> Self {
        Self {
            absolute_timeout,
            inactivity_timeout,
        }
    }
}

impl From<&SessionConfig> for SessionPolicy {
    fn from(config: &SessionConfig) -> Self {
        Self::new(config.absolute_timeout(), config.inactivity_timeout())
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

/// A decrypted key held in memory while its provider is unlocked.
#[derive(Debug)]
pub struct UnlockedEntry {
    key: SecretString,
    pub unlocked_at: i64,
    pub expires_at: i64,
    pub last_activity_at: i64,
}

impl UnlockedEntry {
    pub fn new(key: SecretString, now: i64, policy: &SessionPolicy) -> Self {
        Self {
            key,
            unlocked_at: now,
            expires_at: now.saturating_add(duration_ms(policy.absolute_timeout)),
            last_activity_at: now,
        }
    }

    pub fn is_live(&self, now: i64, policy: &SessionPolicy) -> bool {
        let idle_ok = policy.inactivity_timeout.is_none_or(|idle| {
            now.saturating_sub(self.last_activity_at) < duration_ms(idle)
        });
        now < self.expires_at && idle_ok
    }

    pub fn touch(&mut self, now: i64) {
        self.last_activity_at = self.last_activity_at.max(now);
    }

    /// A fresh copy of the key for handing to a caller.
    pub fn secret(&self) -> SecretString {
        SecretString::from(self.key.expose_secret().to_owned())
    }
}
