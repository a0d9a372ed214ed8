// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `keylock shell` command implementation.
//!
//! An interactive REPL over a single vault service, so unlocked keys stay in
//! memory between commands until locked, expired, or the shell exits. A
//! background sweeper evicts expired sessions.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use keylock_core::{KeylockError, ProviderId};
use keylock_vault::{KeyState, VaultService};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::commands::{self, Output};
use crate::CliError;

/// How often expired sessions are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

const HELP: &str = "\
commands:
  save <provider>             store a new API key
  unlock <provider>           decrypt a key and keep it unlocked
  lock <provider>             forget an unlocked key
  lock-all                    forget every unlocked key
  status <provider>           show whether a key is stored and unlocked
  show <provider>             show the masked unlocked key
  change-password <provider>  re-encrypt a key under a new password
  delete <provider>           remove a stored key
  list                        list stored providers
  requirements                show password rules
  hint <provider>             show the expected key format
  /quit                       lock everything and exit";

/// One parsed shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ShellCommand {
    Save(ProviderId),
    Unlock(ProviderId),
    Lock(ProviderId),
    LockAll,
    Status(ProviderId),
    Show(ProviderId),
    ChangePassword(ProviderId),
    Delete(ProviderId),
    List,
    Requirements,
    Hint(ProviderId),
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<ShellCommand, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default();
    let arg = words.next();
    if words.next().is_some() {
        return Err(format!("too many arguments for `{verb}`"));
    }

    let provider = || -> Result<ProviderId, String> {
        let raw = arg.ok_or_else(|| format!("`{verb}` needs a provider"))?;
        raw.parse().map_err(|e: KeylockError| e.to_string())
    };
    let bare = |command: ShellCommand| -> Result<ShellCommand, String> {
        match arg {
            Some(_) => Err(format!("`{verb}` takes no arguments")),
            None => Ok(command),
        }
    };

    match verb {
        "save" => provider().map(ShellCommand::Save),
        "unlock" => provider().map(ShellCommand::Unlock),
        "lock" => provider().map(ShellCommand::Lock),
        "lock-all" => bare(ShellCommand::LockAll),
        "status" => provider().map(ShellCommand::Status),
        "show" => provider().map(ShellCommand::Show),
        "change-password" => provider().map(ShellCommand::ChangePassword),
        "delete" => provider().map(ShellCommand::Delete),
        "list" => bare(ShellCommand::List),
        "requirements" => bare(ShellCommand::Requirements),
        "hint" => provider().map(ShellCommand::Hint),
        "help" | "?" => bare(ShellCommand::Help),
        "/quit" | "/exit" | "quit" | "exit" => bare(ShellCommand::Quit),
        other => Err(format!("unknown command `{other}`, type `help`")),
    }
}

/// Runs the `keylock shell` interactive REPL.
pub async fn run_shell(service: Arc<VaultService>) -> Result<(), CliError> {
    let cancel = CancellationToken::new();
    let sweeper = service.spawn_sweeper(SWEEP_INTERVAL, cancel.clone());

    let mut rl = DefaultEditor::new()
        .map_err(|e| KeylockError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{}", "keylock shell".bold().green());
    println!("Type {} for commands, {} to exit.\n", "help".yellow(), "/quit".yellow());

    let out = Output::new(false);
    let prompt = format!("{}> ", "keylock".green());
    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(&line);

                let command = match parse_command(trimmed) {
                    Ok(command) => command,
                    Err(message) => {
                        eprintln!("{}: {message}", "error".red());
                        continue;
                    }
                };
                if command == ShellCommand::Quit {
                    break;
                }
                if let Err(e) = handle_command(&service, command, &out).await {
                    out.error(&e);
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        }
    }

    cancel.cancel();
    if let Err(e) = sweeper.await {
        debug!(error = %e, "session sweeper task ended abnormally");
    }
    service.lock_all().await;
    println!("{}", "all keys locked, goodbye".dimmed());
    Ok(())
}

async fn handle_command(
    service: &VaultService,
    command: ShellCommand,
    out: &Output,
) -> Result<(), CliError> {
    match command {
        ShellCommand::Save(provider) => commands::run_save(service, provider, out).await,
        ShellCommand::Unlock(provider) => {
            if let Some(masked) = service.masked_key(&provider) {
                service.record_activity(&provider);
                println!("{} {provider} already unlocked: {masked}", out.ok_mark());
                return Ok(());
            }
            commands::run_unlock(service, provider, false, out).await
        }
        ShellCommand::Lock(provider) => {
            service.lock(&provider).await;
            println!("{} {provider} locked", out.ok_mark());
            Ok(())
        }
        ShellCommand::LockAll => {
            service.lock_all().await;
            println!("{} all providers locked", out.ok_mark());
            Ok(())
        }
        ShellCommand::Status(provider) => {
            let state = service.key_state(&provider).await?;
            let text = match state {
                KeyState::NoKey => "no key stored".dimmed().to_string(),
                KeyState::Locked => "locked".yellow().to_string(),
                KeyState::Unlocked => "unlocked".green().to_string(),
            };
            println!("{provider}: {text}");
            Ok(())
        }
        ShellCommand::Show(provider) => {
            match service.masked_key(&provider) {
                Some(masked) => {
                    service.record_activity(&provider);
                    println!("{provider}: {masked}");
                }
                None => println!("{provider} is not unlocked"),
            }
            Ok(())
        }
        ShellCommand::ChangePassword(provider) => {
            commands::run_change_password(service, provider, out).await
        }
        ShellCommand::Delete(provider) => commands::run_delete(service, provider, out).await,
        ShellCommand::List => commands::run_list(service, out).await,
        ShellCommand::Requirements => commands::run_requirements(out),
        ShellCommand::Hint(provider) => commands::run_hint(&provider, out),
        ShellCommand::Help => {
            println!("{HELP}");
            Ok(())
        }
        ShellCommand::Quit => Ok(()),
    }
}
