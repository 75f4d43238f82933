//! AES-256-GCM key ring.
//!
//! Ciphertext layout: `kid_len (1) | kid | nonce (12) | ciphertext + tag`.
//! New ciphertext is always bound to the active key; decryption picks the key
//! named in the blob, so rotating means adding a key and activating it.

use crate::{EnvelopeError, KeyService};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce, aead::Aead};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use std::collections::HashMap;

/// Encryption key length (256 bits)
const KEY_LEN: usize = 32;
/// Nonce length for AES-GCM (96 bits)
const NONCE_LEN: usize = 12;

pub struct LocalKeyService {
    active: String,
    keys: HashMap<String, [u8; KEY_LEN]>,
}

impl LocalKeyService {
    pub fn new(active: impl Into<String>, key: [u8; KEY_LEN]) -> Result<Self, EnvelopeError> {
        let active = active.into();
        validate_kid(&active)?;
        let mut keys = HashMap::new();
        keys.insert(active.clone(), key);
        Ok(Self { active, keys })
    }

    /// Fresh random key under `kid`.
    pub fn generate(kid: impl Into<String>) -> Result<Self, EnvelopeError> {
        Self::new(kid, random_key()?)
    }

    /// Parse a `kid:base64,kid:base64` key list and activate `active`.
    pub fn from_spec(active: &str, spec: &str) -> Result<Self, EnvelopeError> {
        let mut keys = HashMap::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (kid, encoded) = entry.split_once(':').ok_or_else(|| {
                EnvelopeError::Config("key entries must look like kid:base64".to_string())
            })?;
            validate_kid(kid)?;
            let raw = BASE64
                .decode(encoded)
                .map_err(|_| EnvelopeError::Config(format!("key '{}' is not valid base64", kid)))?;
            let key: [u8; KEY_LEN] = raw.try_into().map_err(|_| {
                EnvelopeError::Config(format!("key '{}' must be {} bytes", kid, KEY_LEN))
            })?;
            keys.insert(kid.to_string(), key);
        }

        if !keys.contains_key(active) {
            return Err(EnvelopeError::Config(format!(
                "active key '{}' is not in the key list",
                active
            )));
        }

        Ok(Self {
            active: active.to_string(),
            keys,
        })
    }

    /// Add a key and make it the active one. Older keys stay available for
    /// decryption.
    pub fn rotate_to(
        mut self,
        kid: impl Into<String>,
        key: [u8; KEY_LEN],
    ) -> Result<Self, EnvelopeError> {
        let kid = kid.into();
        validate_kid(&kid)?;
        self.keys.insert(kid.clone(), key);
        self.active = kid;
        Ok(self)
    }

    fn cipher(&self, kid: &str) -> Result<Aes256Gcm, EnvelopeError> {
        let key = self.keys.get(kid).ok_or(EnvelopeError::Inauthentic)?;
        Aes256Gcm::new_from_slice(key).map_err(|e| EnvelopeError::Config(e.to_string()))
    }
}

pub fn random_key() -> Result<[u8; KEY_LEN], EnvelopeError> {
    let mut key = [0u8; KEY_LEN];
    getrandom::fill(&mut key)
        .map_err(|e| EnvelopeError::Config(format!("Failed to generate key: {}", e)))?;
    Ok(key)
}

fn validate_kid(kid: &str) -> Result<(), EnvelopeError> {
    if kid.is_empty() || kid.len() > u8::MAX as usize {
        return Err(EnvelopeError::Config(
            "key id must be between 1 and 255 bytes".to_string(),
        ));
    }
    Ok(())
}

#[async_trait::async_trait]
impl KeyService for LocalKeyService {
    fn key_id(&self) -> &str {
        &self.active
    }

    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        getrandom::fill(&mut nonce_bytes)
            .map_err(|e| EnvelopeError::Transient(format!("Failed to generate nonce: {}", e)))?;

        let cipher = self.cipher(&self.active)?;
        let nonce = Nonce::from(nonce_bytes);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| EnvelopeError::Transient("encryption failed".to_string()))?;

        let kid = self.active.as_bytes();
        let mut blob = Vec::with_capacity(1 + kid.len() + NONCE_LEN + ciphertext.len());
        blob.push(kid.len() as u8);
        blob.extend_from_slice(kid);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    async fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        let (&kid_len, rest) = blob
            .split_first()
            .ok_or_else(|| EnvelopeError::Malformed("empty ciphertext".to_string()))?;
        let kid_len = kid_len as usize;
        if kid_len == 0 || rest.len() < kid_len + NONCE_LEN {
            return Err(EnvelopeError::Malformed("ciphertext too short".to_string()));
        }

        let kid = std::str::from_utf8(&rest[..kid_len]).map_err(|_| EnvelopeError::Inauthentic)?;
        let nonce_bytes: [u8; NONCE_LEN] = rest[kid_len..kid_len + NONCE_LEN]
            .try_into()
            .map_err(|_| EnvelopeError::Malformed("invalid nonce length".to_string()))?;
        let ciphertext = &rest[kid_len + NONCE_LEN..];

        let cipher = self.cipher(kid)?;
        cipher
            .decrypt(&Nonce::from(nonce_bytes), ciphertext)
            .map_err(|_| EnvelopeError::Inauthentic)
    }
}
