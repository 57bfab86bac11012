//! Service credential encryption at rest (AES-256-GCM).

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nimbus_core::error::{NimbusError, NimbusResult};
use serde_json::Value;

const NONCE_LEN: usize = 12;

/// Encrypts and decrypts credential documents with one AES-256 key.
#[derive(Clone)]
pub struct CredentialCipher {
    key: [u8; 32],
}

impl CredentialCipher {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Returns `base64(nonce || ciphertext || tag)`.
    pub fn seal(&self, credentials: &Value) -> NimbusResult<String> {
        let plaintext = serde_json::to_vec(credentials)
            .map_err(|e| NimbusError::Internal(format!("credentials encode: {e}")))?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|e| NimbusError::Crypto(format!("AES-GCM encrypt: {e}")))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(combined))
    }

    pub fn open(&self, encoded: &str) -> NimbusResult<Value> {
        let combined = STANDARD
            .decode(encoded)
            .map_err(|e| NimbusError::Crypto(format!("base64 decode: {e}")))?;
        if combined.len() <= NONCE_LEN {
            return Err(NimbusError::Crypto("ciphertext too short".into()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| NimbusError::Crypto(format!("AES-GCM decrypt: {e}")))?;

        serde_json::from_slice(&plaintext)
            .map_err(|e| NimbusError::Internal(format!("credentials decode: {e}")))
    }
}
