// SPDX-FileCopyrightText: 2026 Keylock Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Password-based AES-256-GCM encryption of API keys.
//!
//! [`encrypt`] derives a fresh key per call (new salt) and seals with a fresh
//! random 96-bit nonce. The provider id is bound as associated data, so a
//! record copied under another provider fails to open. [`decrypt`] reports
//! every failure as [`CryptoError::AuthenticationFailure`].

use keylock_core::{EncryptedRecord, KdfParams, ProviderId};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::kdf::{self, KEY_LEN, SALT_LEN};

pub const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Wrong password, tampered bytes, or malformed stored parameters.
    #[error("authentication failed")]
    AuthenticationFailure,

    /// Randomness or key setup failed while encrypting.
    #[error("crypto engine failure: {0}")]
    Engine(String),
}

/// Output of [`encrypt`]: everything needed to decrypt later, except the password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSecret {
    /// Ciphertext with the 16-byte GCM tag appended.
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub salt: [u8; SALT_LEN],
    pub kdf: KdfParams,
}

impl SealedSecret {
    /// Attach a provider and timestamps to form a storable record.
    pub fn into_record(self, provider: ProviderId, created_at: i64, updated_at: i64) -> EncryptedRecord {
        EncryptedRecord {
            provider,
            ciphertext: self.ciphertext,
            nonce: self.nonce.to_vec(),
            salt: self.salt.to_vec(),
            kdf_params: self.kdf,
            created_at,
            updated_at,
        }
    }
}

/// Encrypt `plaintext` under a key derived from `password`.
pub fn encrypt(
    plaintext: &[u8],
    password: &SecretString,
    aad: &[u8],
    params: &KdfParams,
) -> Result<SealedSecret, CryptoError> {
    let salt = kdf::generate_salt()?;
    let key = kdf::derive_key(password.expose_secret().as_bytes(), &salt, params)?;
    let (ciphertext, nonce) = seal(&key, plaintext, aad)?;
    Ok(SealedSecret {
        ciphertext,
        nonce,
        salt,
        kdf: *params,
    })
}

/// Decrypt a stored record with `password`.
///
/// The provider id is the associated data. Plaintext that is not UTF-8 is
/// treated as an authentication failure.
pub fn decrypt(record: &EncryptedRecord, password: &SecretString) -> Result<SecretString, CryptoError> {
    let nonce: [u8; NONCE_LEN] = record
        .nonce
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::AuthenticationFailure)?;
    let salt: [u8; SALT_LEN] = record
        .salt
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::AuthenticationFailure)?;

    let key = kdf::derive_key(password.expose_secret().as_bytes(), &salt, &record.kdf_params)
        .map_err(|_| CryptoError::AuthenticationFailure)?;
    let plaintext = open(&key, &nonce, &record.ciphertext, record.provider.as_str().as_bytes())?;

    let text = std::str::from_utf8(&plaintext).map_err(|_| CryptoError::AuthenticationFailure)?;
    Ok(SecretString::from(text.to_owned()))
}

/// Seal with AES-256-GCM under a random nonce. Returns `(ciphertext_with_tag, nonce)`.
fn seal(
    key: &[u8; KEY_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, [u8; NONCE_LEN]), CryptoError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| CryptoError::Engine("failed to create AES-256-GCM key".to_string()))?;
    let less_safe = LessSafeKey::new(unbound);

    let rng = SystemRandom::new();
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill(&mut nonce_bytes)
        .map_err(|_| CryptoError::Engine("failed to generate random nonce".to_string()))?;
    let nonce = Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext.to_vec();
    less_safe
        .seal_in_place_append_tag(nonce, Aad::from(aad), &mut in_out)
        .map_err(|_| CryptoError::Engine("AES-256-GCM encryption failed".to_string()))?;

    Ok((in_out, nonce_bytes))
}

fn open(
    key: &[u8; KEY_LEN],
    nonce_bytes: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let unbound =
        UnboundKey::new(&AES_256_GCM, key).map_err(|_| CryptoError::AuthenticationFailure)?;
    let less_safe = LessSafeKey::new(unbound);
    let nonce = Nonce::assume_unique_for_key(*nonce_bytes);

    let mut in_out = Zeroizing::new(ciphertext.to_vec());
    let plaintext_len = less_safe
        .open_in_place(nonce, Aad::from(aad), &mut in_out)
        .map_err(|_| CryptoError::AuthenticationFailure)?
        .len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}
