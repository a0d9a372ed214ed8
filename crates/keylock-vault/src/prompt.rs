// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret acquisition via environment variable or TTY prompt.
//!
//! Each secret is read from its `KEYLOCK_*` variable when set (headless use),
//! otherwise from an interactive prompt with echo disabled.

use std::io::IsTerminal;

use keylock_core::KeylockError;
use secrecy::{ExposeSecret, SecretString};

/// Vault password for save, unlock, and the old password of a change.
pub const PASSWORD_ENV_VAR: &str = "KEYLOCK_PASSWORD";
/// New password for a password change.
pub const NEW_PASSWORD_ENV_VAR: &str = "KEYLOCK_NEW_PASSWORD";
/// API key to save.
pub const API_KEY_ENV_VAR: &str = "KEYLOCK_API_KEY";

/// Read one secret from `env_var` or the terminal.
pub fn read_secret(env_var: &str, label: &str) -> Result<SecretString, KeylockError> {
    if let Some(value) = from_env(env_var) {
        return Ok(value);
    }

    if std::io::stdin().is_terminal() {
        let value = prompt(&format!("Enter {label}"))?;
        if value.expose_secret().is_empty() {
            return Err(KeylockError::Vault(format!("empty {label} not allowed")));
        }
        return Ok(value);
    }

    Err(KeylockError::Vault(format!(
        "no {label} provided. Set {env_var} or run interactively."
    )))
}

/// Read a secret and its confirmation.
///
/// The pair is returned unchecked so the vault can report a mismatch itself.
/// An environment variable supplies both halves.
pub fn read_secret_with_confirm(
    env_var: &str,
    label: &str,
) -> Result<(SecretString, SecretString), KeylockError> {
    if let Some(value) = from_env(env_var) {
        let confirm = SecretString::from(value.expose_secret().to_owned());
        return Ok((value, confirm));
    }

    if std::io::stdin().is_terminal() {
        let first = prompt(&format!("Enter {label}"))?;
        let second = prompt(&format!("Confirm {label}"))?;
        return Ok((first, second));
    }

    Err(KeylockError::Vault(format!(
        "no {label} provided. Set {env_var} or run interactively."
    )))
}

pub fn read_password() -> Result<SecretString, KeylockError> {
    read_secret(PASSWORD_ENV_VAR, "password")
}

pub fn read_api_key() -> Result<SecretString, KeylockError> {
    read_secret(API_KEY_ENV_VAR, "API key")
}

fn from_env(env_var: &str) -> Option<SecretString> {
    std::env::var(env_var)
        .ok()
        .filter(|value| !value.is_empty())
        .map(SecretString::from)
}

fn prompt(text: &str) -> Result<SecretString, KeylockError> {
    eprint!("{text}: ");
    rpassword::read_password()
        .map(SecretString::from)
        .map_err(|e| KeylockError::Vault(format!("failed to read secret: {e}")))
}
