// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stateless password-strength and API-key format rules.

use std::sync::LazyLock;

use keylock_core::{KnownProvider, ProviderId};
use regex::Regex;
use serde::Serialize;
use strum::{Display, EnumIter, IntoEnumIterator};

/// Minimum password length in characters.
pub const MIN_PASSWORD_LEN: usize = 12;

/// Marker contained in every masked key.
pub const MASK_MARKER: &str = "****";

/// Keys at least this long keep a recognizable prefix and suffix when masked.
const MASK_REVEAL_MIN_LEN: usize = 16;
const MASK_PREFIX_CHARS: usize = 7;
const MASK_SUFFIX_CHARS: usize = 4;

/// One password-strength rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PasswordRule {
    MinLength,
    Uppercase,
    Lowercase,
    Digit,
    Symbol,
}

impl PasswordRule {
    pub fn description(self) -> &'static str {
        match self {
            PasswordRule::MinLength => "at least 12 characters",
            PasswordRule::Uppercase => "at least one uppercase letter",
            PasswordRule::Lowercase => "at least one lowercase letter",
            PasswordRule::Digit => "at least one digit",
            PasswordRule::Symbol => "at least one symbol",
        }
    }

    fn is_satisfied_by(self, password: &str) -> bool {
        match self {
            PasswordRule::MinLength => password.chars().count() >= MIN_PASSWORD_LEN,
            PasswordRule::Uppercase => password.chars().any(char::is_uppercase),
            PasswordRule::Lowercase => password.chars().any(char::is_lowercase),
            PasswordRule::Digit => password.chars().any(|c| c.is_ascii_digit()),
            PasswordRule::Symbol => password
                .chars()
                .any(|c| !c.is_alphanumeric() && !c.is_whitespace()),
        }
    }
}

/// A rule and its human-readable description, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PasswordRequirement {
    pub rule: PasswordRule,
    pub description: &'static str,
}

/// Outcome of [`validate_password`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordValidation {
    pub valid: bool,
    /// Every violated rule, in rule order.
    pub errors: Vec<PasswordRule>,
}

/// Check a password against every rule.
pub fn validate_password(password: &str) -> PasswordValidation {
    let errors: Vec<PasswordRule> = PasswordRule::iter()
        .filter(|rule| !rule.is_satisfied_by(password))
        .collect();
    PasswordValidation {
        valid: errors.is_empty(),
        errors,
    }
}

/// The full rule set, in the order violations are reported.
pub fn password_requirements() -> Vec<PasswordRequirement> {
    PasswordRule::iter()
        .map(|rule| PasswordRequirement {
            rule,
            description: rule.description(),
        })
        .collect()
}

static OPENAI_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^sk-[A-Za-z0-9_\-]{20,}$").unwrap());
static ANTHROPIC_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^sk-ant-[A-Za-z0-9_\-]{20,}$").unwrap());
static OPENROUTER_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^sk-or-[A-Za-z0-9_\-]{20,}$").unwrap());

struct KeyFormat {
    label: &'static str,
    prefix: &'static str,
    pattern: &'static LazyLock<Regex>,
    /// Longer prefixes that belong to other providers.
    foreign_prefixes: &'static [&'static str],
}

fn key_format(provider: KnownProvider) -> KeyFormat {
    match provider {
        KnownProvider::OpenAi => KeyFormat {
            label: "OpenAI",
            prefix: "sk-",
            pattern: &OPENAI_KEY,
            foreign_prefixes: &["sk-ant-", "sk-or-"],
        },
        KnownProvider::Anthropic => KeyFormat {
            label: "Anthropic",
            prefix: "sk-ant-",
            pattern: &ANTHROPIC_KEY,
            foreign_prefixes: &[],
        },
        KnownProvider::OpenRouter => KeyFormat {
            label: "OpenRouter",
            prefix: "sk-or-",
            pattern: &OPENROUTER_KEY,
            foreign_prefixes: &[],
        },
    }
}

/// Structural check of an API key for a provider. Unknown providers fail closed.
pub fn validate_api_key(provider: &ProviderId, candidate: &str) -> bool {
    provider.known().is_some_and(|known| {
        let format = key_format(known);
        format.pattern.is_match(candidate)
            && !format
                .foreign_prefixes
                .iter()
                .any(|prefix| candidate.starts_with(prefix))
    })
}

/// Describe the expected key format for a provider, including its prefix.
pub fn api_key_format_hint(provider: &ProviderId) -> String {
    match provider.known() {
        Some(known) => {
            let format = key_format(known);
            format!(
                "{} keys start with `{}` followed by at least 20 letters, digits, `-` or `_`",
                format.label, format.prefix
            )
        }
        None => format!("`{provider}` is not a supported provider"),
    }
}

/// Display-safe form of a key.
///
/// Long keys keep the first 7 and last 4 characters around [`MASK_MARKER`];
/// shorter keys become `len + 4` asterisks. The output length always differs
/// from the input length, so the mask never equals the key.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < MASK_REVEAL_MIN_LEN {
        return "*".repeat(chars.len() + MASK_MARKER.len());
    }
    let prefix: String = chars[..MASK_PREFIX_CHARS].iter().collect();
    let suffix: String = chars[chars.len() - MASK_SUFFIX_CHARS..].iter().collect();
    format!("{prefix}{MASK_MARKER}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(s: &str) -> ProviderId {
        s.parse().unwrap()
    }

    #[test]
    fn strong_password_passes() {
        let result = validate_password("StrongPassword123!");
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn weak_password_reports_every_violation() {
        let result = validate_password("weak");
        assert!(!result.valid);
        assert_eq!(
            result.errors,
            vec![
                PasswordRule::MinLength,
                PasswordRule::Uppercase,
                PasswordRule::Digit,
                PasswordRule::Symbol,
            ]
        );
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        // 11 characters, more than 12 bytes.
        let result = validate_password("Ünïcödé1!ab");
        assert_eq!(result.errors, vec![PasswordRule::MinLength]);
    }

    #[test]
    fn whitespace_is_not_a_symbol() {
        let result = validate_password("Long Password 123");
        assert_eq!(result.errors, vec![PasswordRule::Symbol]);
    }

    #[test]
    fn requirements_enumerate_all_rules() {
        let reqs = password_requirements();
        assert_eq!(reqs.len(), 5);
        assert!(reqs[0].description.contains(&MIN_PASSWORD_LEN.to_string()));
    }

    #[test]
    fn api_keys_match_provider_prefixes() {
        assert!(validate_api_key(&id("openai"), "sk-proj-abcdefghijklmnopqrstuvwxyz123456"));
        assert!(validate_api_key(&id("anthropic"), "sk-ant-REDACTED"));
        assert!(validate_api_key(&id("openrouter"), "sk-or-v1-0123456789abcdef0123456789abcdef"));

        assert!(!validate_api_key(&id("anthropic"), "sk-proj-abcdefghijklmnopqrstuvwxyz123456"));
        assert!(!validate_api_key(&id("openrouter"), "sk-ant-REDACTED"));
    }

    #[test]
    fn api_keys_are_rejected_under_other_providers() {
        let keys = [
            ("openai", "sk-proj-abcdefghijklmnopqrstuvwxyz123456"),
            ("anthropic", "sk-ant-REDACTED"),
            ("openrouter", "sk-or-v1-0123456789abcdef0123456789abcdef"),
        ];
        for (owner, key) in keys {
            for (other, _) in keys {
                assert_eq!(
                    validate_api_key(&id(other), key),
                    owner == other,
                    "{owner} key checked as {other}"
                );
            }
        }
    }

    #[test]
    fn api_key_remainder_must_be_long_enough() {
        assert!(!validate_api_key(&id("openai"), "sk-short"));
        assert!(!validate_api_key(&id("anthropic"), "sk-ant-1234567890123456789"));
        assert!(validate_api_key(&id("anthropic"), "sk-ant-REDACTED"));
    }

    #[test]
    fn api_key_rejects_surrounding_whitespace_and_bad_chars() {
        assert!(!validate_api_key(&id("openai"), " sk-abcdefghijklmnopqrstuvwxyz"));
        assert!(!validate_api_key(&id("openai"), "sk-abcdefghijklmnopqrstuvwxyz\n"));
        assert!(!validate_api_key(&id("openai"), "sk-abcdefghij.klmnopqrstuvwxyz"));
    }

    #[test]
    fn unknown_provider_fails_closed() {
        assert!(!validate_api_key(&id("mistral"), "sk-abcdefghijklmnopqrstuvwxyz"));
    }

    #[test]
    fn hints_contain_prefix() {
        assert!(api_key_format_hint(&id("openai")).contains("`sk-`"));
        assert!(api_key_format_hint(&id("anthropic")).contains("`sk-ant-`"));
        assert!(api_key_format_hint(&id("openrouter")).contains("`sk-or-`"));
        assert!(api_key_format_hint(&id("mistral")).contains("not a supported provider"));
    }

    #[test]
    fn mask_keeps_prefix_and_suffix() {
        let masked = mask_api_key("sk-proj-abcdefghijklmnopqrstuvwxyz");
        assert_eq!(masked, "sk-proj****wxyz");
    }

    #[test]
    fn mask_short_key_fully() {
        assert_eq!(mask_api_key("short"), "*********");
        assert_eq!(mask_api_key(""), "****");
        assert_ne!(mask_api_key("****"), "****");
    }

    proptest! {
        #[test]
        fn mask_never_equals_input(key in "\\PC{0,64}") {
            let masked = mask_api_key(&key);
            prop_assert_ne!(&masked, &key);
            prop_assert!(masked.contains(MASK_MARKER));
        }

        #[test]
        fn validation_reports_only_real_violations(pw in "\\PC{0,32}") {
            let result = validate_password(&pw);
            prop_assert_eq!(result.valid, result.errors.is_empty());
            for rule in result.errors {
                prop_assert!(!rule.is_satisfied_by(&pw));
            }
        }
    }
}
