// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keylock - a password-gated vault for LLM provider API keys.
//!
//! This is the binary entry point.

mod commands;
mod shell;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use keylock_config::KeylockConfig;
use keylock_core::{KeylockError, ProviderId};
use keylock_storage::SqliteStorage;
use keylock_vault::{VaultError, VaultOptions, VaultService};
use thiserror::Error;

use crate::commands::Output;

/// Keylock - a password-gated vault for LLM provider API keys.
#[derive(Parser, Debug)]
#[command(name = "keylock", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit machine-readable JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
///
/// Secrets are read from `KEYLOCK_PASSWORD`, `KEYLOCK_NEW_PASSWORD` and
/// `KEYLOCK_API_KEY` when set, otherwise prompted for on the terminal.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt and store an API key for a provider.
    Save { provider: ProviderId },
    /// Decrypt a stored key and show it (masked unless --reveal).
    Unlock {
        provider: ProviderId,
        /// Print the full key instead of the masked form.
        #[arg(long)]
        reveal: bool,
    },
    /// Re-encrypt a stored key under a new password.
    ChangePassword { provider: ProviderId },
    /// Remove the stored key for a provider.
    Delete { provider: ProviderId },
    /// List providers with stored keys.
    List,
    /// Show the password strength rules.
    Requirements,
    /// Check a password against the strength rules.
    CheckPassword,
    /// Describe the expected API key format for a provider.
    Hint { provider: ProviderId },
    /// Check an API key against a provider's format.
    CheckKey { provider: ProviderId },
    /// Print the masked form of an API key.
    Mask,
    /// Launch an interactive session that keeps keys unlocked in memory.
    Shell,
}

/// Failure of a CLI command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Keylock(#[from] KeylockError),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => keylock_config::load_and_validate_path(path),
        None => keylock_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            keylock_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging.level);

    let out = Output::new(cli.json);
    if let Err(e) = run(cli.command, &config, &out).await {
        out.error(&e);
        std::process::exit(1);
    }
}

async fn run(
    command: Option<Commands>,
    config: &KeylockConfig,
    out: &Output,
) -> Result<(), CliError> {
    // Commands that never touch storage.
    match &command {
        Some(Commands::Requirements) => return commands::run_requirements(out),
        Some(Commands::CheckPassword) => return commands::run_check_password(out),
        Some(Commands::Hint { provider }) => return commands::run_hint(provider, out),
        Some(Commands::CheckKey { provider }) => return commands::run_check_key(provider, out),
        Some(Commands::Mask) => return commands::run_mask(out),
        None => {
            println!("keylock: use --help for available commands");
            return Ok(());
        }
        _ => {}
    }

    let (service, storage) = open_vault(config).await?;
    let result = match command {
        Some(Commands::Save { provider }) => commands::run_save(&service, provider, out).await,
        Some(Commands::Unlock { provider, reveal }) => {
            commands::run_unlock(&service, provider, reveal, out).await
        }
        Some(Commands::ChangePassword { provider }) => {
            commands::run_change_password(&service, provider, out).await
        }
        Some(Commands::Delete { provider }) => commands::run_delete(&service, provider, out).await,
        Some(Commands::List) => commands::run_list(&service, out).await,
        Some(Commands::Shell) => shell::run_shell(Arc::clone(&service)).await,
        _ => Ok(()),
    };

    service.lock_all().await;
    drop(service);
    storage.close().await?;
    result
}

/// Open the SQLite store and build the vault service over it.
async fn open_vault(config: &KeylockConfig) -> Result<(Arc<VaultService>, SqliteStorage), CliError> {
    let storage = SqliteStorage::open(&config.storage).await?;
    let service = VaultService::new(
        Arc::new(storage.clone()),
        Arc::new(storage.clone()),
        VaultOptions::from_config(config),
    );
    Ok((Arc::new(service), storage))
}

/// Initialize the tracing subscriber with an env filter. Logs go to stderr.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("keylock={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
