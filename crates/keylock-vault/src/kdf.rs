// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Argon2id key derivation from a password.
//!
//! Derives a 32-byte key using the parameters stored with each record, so a
//! record sealed under older work factors still opens after the defaults move.

use keylock_config::validation::MAX_KDF_MEMORY_COST;
use keylock_core::{KdfAlgorithm, KdfParams};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use crate::crypto::CryptoError;

pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 16;

/// Upper bounds on iteration and lane counts accepted from stored records.
const MAX_ITERATIONS: u32 = 64;
const MAX_PARALLELISM: u32 = 16;

/// Derive a 32-byte key from a password using Argon2id.
///
/// Parameters outside the accepted bounds are refused before any work is done,
/// so a tampered record cannot request unbounded memory.
pub fn derive_key(
    password: &[u8],
    salt: &[u8; SALT_LEN],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    check_params(params)?;
    let version = match params.version {
        0x13 => argon2::Version::V0x13,
        0x10 => argon2::Version::V0x10,
        other => {
            return Err(CryptoError::Engine(format!(
                "unsupported Argon2 version {other:#x}"
            )));
        }
    };
    let argon_params = argon2::Params::new(
        params.memory_cost,
        params.iterations,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| CryptoError::Engine(format!("invalid Argon2id parameters: {e}")))?;

    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, version, argon_params);

    let mut output = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password, salt, output.as_mut())
        .map_err(|e| CryptoError::Engine(format!("Argon2id key derivation failed: {e}")))?;

    Ok(output)
}

fn check_params(params: &KdfParams) -> Result<(), CryptoError> {
    let KdfAlgorithm::Argon2id = params.algorithm;
    if params.memory_cost > MAX_KDF_MEMORY_COST
        || params.iterations == 0
        || params.iterations > MAX_ITERATIONS
        || params.parallelism == 0
        || params.parallelism > MAX_PARALLELISM
    {
        return Err(CryptoError::Engine(format!(
            "KDF parameters out of bounds: m={} t={} p={}",
            params.memory_cost, params.iterations, params.parallelism
        )));
    }
    Ok(())
}

/// Generate a random 16-byte salt.
pub fn generate_salt() -> Result<[u8; SALT_LEN], CryptoError> {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt)
        .map_err(|_| CryptoError::Engine("failed to generate random salt".to_string()))?;
    Ok(salt)
}
