use anyhow::{anyhow, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{ChaCha20Poly1305, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{DecryptionFailed, KeyDerivationFailed};

const NONCE_LEN: usize = 12;
const SALT_LEN: usize = 16;

/// How many leading bytes of the user id feed the salt digest. Stable so
/// that the same user always derives the same key on the same device.
const SALT_USER_ID_PREFIX: usize = 8;

/// The application secret provisioned by the hosting application. Never
/// persisted by this crate.
#[derive(Clone)]
pub struct AppSecret(Vec<u8>);

impl AppSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = secret.into();
        if bytes.is_empty() {
            return Err(KeyDerivationFailed {
                reason: "application secret is empty".to_string(),
            }
            .into());
        }
        Ok(Self(bytes))
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for AppSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AppSecret(..)")
    }
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct KdfParams {
    pub m_cost_kib: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl KdfParams {
    pub fn for_test() -> Self {
        Self {
            m_cost_kib: 1024,
            t_cost: 1,
            p_cost: 1,
        }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost_kib: 19 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

fn salt_for_user(user_id: &str) -> [u8; SALT_LEN] {
    let bytes = user_id.as_bytes();
    let prefix = &bytes[..bytes.len().min(SALT_USER_ID_PREFIX)];

    let digest = Sha256::digest(prefix);
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&digest[..SALT_LEN]);
    salt
}

/// Deterministic per-user key: a pure function of `(secret, user_id)`.
/// Rederived on every operation; never cached or persisted.
pub fn derive_user_key(secret: &AppSecret, user_id: &str, params: &KdfParams) -> Result<[u8; 32]> {
    let argon_params = Params::new(params.m_cost_kib, params.t_cost, params.p_cost, Some(32))
        .map_err(|e| KeyDerivationFailed {
            reason: format!("argon2 params: {e}"),
        })?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut material = Vec::with_capacity(secret.as_bytes().len() + user_id.len());
    material.extend_from_slice(secret.as_bytes());
    material.extend_from_slice(user_id.as_bytes());

    let mut output = [0u8; 32];
    argon2
        .hash_password_into(&material, &salt_for_user(user_id), &mut output)
        .map_err(|e| KeyDerivationFailed {
            reason: format!("argon2 hash: {e}"),
        })?;
    Ok(output)
}

/// AEAD-encrypt `plaintext` under `key`. A fresh random 96-bit nonce is
/// generated per call and prepended to the ciphertext before base64.
pub fn encrypt_string(key: &[u8; 32], plaintext: &str, aad: &str) -> Result<String> {
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| KeyDerivationFailed {
        reason: "invalid key length".to_string(),
    })?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext.as_bytes(),
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| anyhow!("aead encrypt failed"))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(B64.encode(blob))
}

/// Inverse of [`encrypt_string`]. Every failure mode (bad base64, short
/// blob, authentication failure, non-UTF-8 plaintext) surfaces as
/// [`DecryptionFailed`], never as garbage output.
pub fn decrypt_string(key: &[u8; 32], ciphertext_b64: &str, aad: &str) -> Result<String> {
    let fail = || DecryptionFailed {
        context: aad.to_string(),
    };

    let blob = B64.decode(ciphertext_b64).map_err(|_| fail())?;
    if blob.len() < NONCE_LEN {
        return Err(fail().into());
    }

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| fail())?;
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| fail())?;

    String::from_utf8(plaintext).map_err(|_| fail().into())
}
