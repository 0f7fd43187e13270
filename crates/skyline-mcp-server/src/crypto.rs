//! Key handling and the AES-256-GCM envelope.

use aes_gcm::aead::{Aead, KeyInit, OsRng, rand_core::RngCore};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretBox};

use crate::errors::GatewayError;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

/// The store encryption key, held behind `secrecy` so it never Debug-prints.
#[derive(Debug)]
pub struct StoreKey(SecretBox<[u8; KEY_LEN]>);

impl StoreKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(SecretBox::new(Box::new(bytes)))
    }

    /// Accept a key as raw 32 bytes, base64, or hex. `base64:`/`hex:`
    /// prefixes force an encoding; otherwise all three are tried.
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        let raw = raw.trim();
        if let Some(encoded) = raw.strip_prefix("base64:") {
            return Self::from_decoded(BASE64.decode(encoded).map_err(|e| {
                GatewayError::Crypto(format!("invalid base64 key: {e}"))
            })?);
        }
        if let Some(encoded) = raw.strip_prefix("hex:") {
            return Self::from_decoded(
                hex::decode(encoded)
                    .map_err(|e| GatewayError::Crypto(format!("invalid hex key: {e}")))?,
            );
        }
        if raw.len() == KEY_LEN {
            return Self::from_decoded(raw.as_bytes().to_vec());
        }
        if let Ok(decoded) = BASE64.decode(raw) {
            if decoded.len() == KEY_LEN {
                return Self::from_decoded(decoded);
            }
        }
        if let Ok(decoded) = hex::decode(raw) {
            if decoded.len() == KEY_LEN {
                return Self::from_decoded(decoded);
            }
        }
        Err(GatewayError::Crypto(
            "key must be 32 bytes, raw, base64, or hex".to_string(),
        ))
    }

    fn from_decoded(bytes: Vec<u8>) -> Result<Self, GatewayError> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            GatewayError::Crypto(format!("key must decode to exactly {KEY_LEN} bytes"))
        })?;
        Ok(Self::from_bytes(bytes))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.0.expose_secret()))
    }

    /// Encrypt with a fresh random nonce. Returns `(nonce, ciphertext)`; the
    /// GCM tag is appended to the ciphertext.
    pub fn seal(&self, plaintext: &[u8]) -> Result<([u8; NONCE_LEN], Vec<u8>), GatewayError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| GatewayError::Crypto("encryption failed".to_string()))?;
        Ok((nonce, ciphertext))
    }

    pub fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, GatewayError> {
        if nonce.len() != NONCE_LEN {
            return Err(GatewayError::Crypto(format!(
                "nonce must be {NONCE_LEN} bytes"
            )));
        }
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                GatewayError::Crypto("decryption failed: wrong key or tampered data".to_string())
            })
    }
}
