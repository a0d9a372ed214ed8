// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot `keylock` subcommands.
//!
//! Each command prints human-readable output, colored when stdout is a TTY,
//! or a JSON document with `--json`. Key material is only printed in full by
//! `unlock --reveal`.

use std::io::IsTerminal;

use colored::Colorize;
use keylock_core::ProviderId;
use keylock_vault::prompt::{self, NEW_PASSWORD_ENV_VAR, PASSWORD_ENV_VAR};
use keylock_vault::{
    api_key_format_hint, mask_api_key, password_requirements, validate_api_key,
    validate_password, ChangePasswordRequest, PasswordRule, SaveKeyRequest, VaultError,
    VaultService,
};
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::CliError;

/// Output mode for a command run.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    json: bool,
    color: bool,
}

impl Output {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            color: !json && std::io::stdout().is_terminal(),
        }
    }

    /// Print `value` as JSON, or `text` otherwise.
    pub fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) {
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
            );
        } else {
            println!("{}", text());
        }
    }

    pub fn ok_mark(&self) -> String {
        if self.color {
            "✓".green().to_string()
        } else {
            "[OK]".to_string()
        }
    }

    pub fn fail_mark(&self) -> String {
        if self.color {
            "✗".red().to_string()
        } else {
            "[FAIL]".to_string()
        }
    }

    /// Report a failed command on stderr, or as a JSON error payload on stdout.
    pub fn error(&self, err: &CliError) {
        match err {
            CliError::Vault(vault) if self.json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&vault.payload())
                        .unwrap_or_else(|_| "{}".to_string())
                );
            }
            CliError::Vault(vault) => {
                let label = if self.color {
                    "error".red().to_string()
                } else {
                    "error".to_string()
                };
                eprintln!("{label} [{}]: {vault}", vault.code());
                for line in error_details(vault) {
                    eprintln!("  {line}");
                }
            }
            CliError::Keylock(e) => {
                if self.json {
                    println!("{}", serde_json::json!({ "code": "ERROR", "message": e.to_string() }));
                } else {
                    eprintln!("error: {e}");
                }
            }
        }
    }
}

/// Extra guidance lines shown under a vault error.
pub fn error_details(err: &VaultError) -> Vec<String> {
    match err {
        VaultError::InvalidPassword { violations } => violations
            .iter()
            .map(|rule| format!("- needs {}", rule.description()))
            .collect(),
        VaultError::InvalidApiKey { provider } => vec![api_key_format_hint(provider)],
        VaultError::RateLimited { retry_after_ms } => {
            vec![format!("try again in {}s", retry_after_ms.div_ceil(1000))]
        }
        _ => Vec::new(),
    }
}

#[derive(Debug, Serialize)]
pub struct KeyReport {
    pub provider: ProviderId,
    pub masked_key: String,
}

#[derive(Debug, Serialize)]
pub struct RevealReport {
    pub provider: ProviderId,
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct ProviderReport {
    pub provider: ProviderId,
}

#[derive(Debug, Serialize)]
pub struct PasswordReport {
    pub valid: bool,
    pub violations: Vec<PasswordRule>,
}

#[derive(Debug, Serialize)]
pub struct KeyCheckReport {
    pub provider: ProviderId,
    pub valid: bool,
    pub hint: String,
}

pub async fn run_save(
    service: &VaultService,
    provider: ProviderId,
    out: &Output,
) -> Result<(), CliError> {
    let api_key = prompt::read_api_key()?;
    let (password, confirm_password) =
        prompt::read_secret_with_confirm(PASSWORD_ENV_VAR, "password")?;
    let masked_key = mask_api_key(api_key.expose_secret());

    service
        .save_key(SaveKeyRequest {
            provider: provider.clone(),
            api_key,
            password,
            confirm_password,
        })
        .await?;

    let report = KeyReport {
        provider,
        masked_key,
    };
    out.emit(&report, || {
        format!(
            "{} saved {} for {}",
            out.ok_mark(),
            report.masked_key,
            report.provider
        )
    });
    Ok(())
}

pub async fn run_unlock(
    service: &VaultService,
    provider: ProviderId,
    reveal: bool,
    out: &Output,
) -> Result<(), CliError> {
    let password = prompt::read_password()?;
    let key = service.unlock(&provider, &password).await?;

    if reveal {
        let report = RevealReport {
            provider,
            api_key: key.expose_secret().to_owned(),
        };
        out.emit(&report, || report.api_key.clone());
    } else {
        let report = KeyReport {
            provider,
            masked_key: mask_api_key(key.expose_secret()),
        };
        out.emit(&report, || {
            format!(
                "{} unlocked {}: {}",
                out.ok_mark(),
                report.provider,
                report.masked_key
            )
        });
    }
    Ok(())
}

pub async fn run_change_password(
    service: &VaultService,
    provider: ProviderId,
    out: &Output,
) -> Result<(), CliError> {
    let old_password = prompt::read_password()?;
    let (new_password, confirm_new_password) =
        prompt::read_secret_with_confirm(NEW_PASSWORD_ENV_VAR, "new password")?;

    service
        .change_password(ChangePasswordRequest {
            provider: provider.clone(),
            old_password,
            new_password,
            confirm_new_password,
        })
        .await?;

    let report = ProviderReport { provider };
    out.emit(&report, || {
        format!("{} password changed for {}", out.ok_mark(), report.provider)
    });
    Ok(())
}

pub async fn run_delete(
    service: &VaultService,
    provider: ProviderId,
    out: &Output,
) -> Result<(), CliError> {
    if !service.has_key(&provider).await? {
        return Err(VaultError::KeyNotFound { provider }.into());
    }
    service.delete_key(&provider).await?;

    let report = ProviderReport { provider };
    out.emit(&report, || {
        format!("{} deleted key for {}", out.ok_mark(), report.provider)
    });
    Ok(())
}

pub async fn run_list(service: &VaultService, out: &Output) -> Result<(), CliError> {
    let providers = service.list_providers().await?;
    out.emit(&providers, || {
        if providers.is_empty() {
            return "no keys stored".to_string();
        }
        let mut lines = vec![format!("{:<16} {:<10} {}", "PROVIDER", "STATE", "UPDATED")];
        for status in &providers {
            let state = if status.is_unlocked { "unlocked" } else { "locked" };
            lines.push(format!(
                "{:<16} {:<10} {}",
                status.provider,
                state,
                format_timestamp(status.updated_at)
            ));
        }
        lines.join("\n")
    });
    Ok(())
}

pub fn run_requirements(out: &Output) -> Result<(), CliError> {
    let requirements = password_requirements();
    out.emit(&requirements, || {
        let mut lines = vec!["Passwords need:".to_string()];
        lines.extend(
            requirements
                .iter()
                .map(|req| format!("  - {}", req.description)),
        );
        lines.join("\n")
    });
    Ok(())
}

pub fn run_check_password(out: &Output) -> Result<(), CliError> {
    let password = prompt::read_password()?;
    let result = validate_password(password.expose_secret());
    let report = PasswordReport {
        valid: result.valid,
        violations: result.errors,
    };
    out.emit(&report, || {
        if report.valid {
            return format!("{} password meets every requirement", out.ok_mark());
        }
        let mut lines = vec![format!("{} password is too weak", out.fail_mark())];
        lines.extend(
            report
                .violations
                .iter()
                .map(|rule| format!("  - needs {}", rule.description())),
        );
        lines.join("\n")
    });
    Ok(())
}

pub fn run_hint(provider: &ProviderId, out: &Output) -> Result<(), CliError> {
    let report = KeyCheckReport {
        provider: provider.clone(),
        valid: provider.known().is_some(),
        hint: api_key_format_hint(provider),
    };
    out.emit(&report, || report.hint.clone());
    Ok(())
}

pub fn run_check_key(provider: &ProviderId, out: &Output) -> Result<(), CliError> {
    let api_key = prompt::read_api_key()?;
    let report = KeyCheckReport {
        provider: provider.clone(),
        valid: validate_api_key(provider, api_key.expose_secret()),
        hint: api_key_format_hint(provider),
    };
    out.emit(&report, || {
        if report.valid {
            format!("{} valid {} key", out.ok_mark(), report.provider)
        } else {
            format!("{} invalid key: {}", out.fail_mark(), report.hint)
        }
    });
    Ok(())
}

pub fn run_mask(out: &Output) -> Result<(), CliError> {
    let api_key = prompt::read_api_key()?;
    let masked = mask_api_key(api_key.expose_secret());
    out.emit(&serde_json::json!({ "masked_key": masked }), || masked.clone());
    Ok(())
}

/// Render epoch milliseconds as a UTC timestamp.
pub fn format_timestamp(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%SZ").to_string())
        .unwrap_or_else(|| ms.to_string())
}
