//! Cryptographic envelope.
//!
//! Encrypts opaque payloads against a keyed service and hands them around as
//! base64 text. Two key services exist:
//! - [`KmsKeyService`] backed by a remote KMS key (feature `aws`)
//! - [`LocalKeyService`] an AES-256-GCM key ring for development and tests
//!
//! Nothing in this crate logs plaintext or ciphertext.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use cierge_types::Sealed;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;

pub mod kms;
pub mod local;

pub use kms::{KmsConfig, KmsKeyService};
pub use local::LocalKeyService;

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// KMS unreachable, throttled or timed out.
    #[error("Key service unavailable: {0}")]
    Transient(String),

    #[error("Malformed ciphertext: {0}")]
    Malformed(String),

    /// Wrong key or tampered ciphertext.
    #[error("Ciphertext failed authentication")]
    Inauthentic,

    #[error("Key service configuration error: {0}")]
    Config(String),
}

impl From<base64::DecodeError> for EnvelopeError {
    fn from(e: base64::DecodeError) -> Self {
        EnvelopeError::Malformed(e.to_string())
    }
}

/// A keyed symmetric encryption service.
///
/// Implementations work on raw bytes; base64 framing is handled by
/// [`Envelope`].
#[async_trait::async_trait]
pub trait KeyService: Send + Sync {
    /// Identifier of the key new ciphertexts are bound to.
    fn key_id(&self) -> &str;

    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError>;

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, EnvelopeError>;
}

/// Base64 wrapper around a [`KeyService`].
#[derive(Clone)]
pub struct Envelope {
    service: Arc<dyn KeyService>,
}

impl Envelope {
    pub fn new(service: Arc<dyn KeyService>) -> Self {
        Self { service }
    }

    pub fn key_id(&self) -> &str {
        self.service.key_id()
    }

    pub async fn encrypt(&self, plaintext: &[u8]) -> Result<Sealed, EnvelopeError> {
        let ciphertext = self.service.encrypt(plaintext).await?;
        Ok(Sealed::new(BASE64.encode(ciphertext)))
    }

    pub async fn decrypt(&self, sealed: &Sealed) -> Result<Vec<u8>, EnvelopeError> {
        let ciphertext = BASE64.decode(sealed.as_str())?;
        self.service.decrypt(&ciphertext).await
    }

    /// Decrypt and encrypt again under the currently active key.
    pub async fn reencrypt(&self, sealed: &Sealed) -> Result<Sealed, EnvelopeError> {
        let plaintext = self.decrypt(sealed).await?;
        let resealed = self.encrypt(&plaintext).await?;
        tracing::debug!(key_id = %self.key_id(), "Re-encrypted payload");
        Ok(resealed)
    }

    pub async fn seal_json<T: Serialize>(&self, value: &T) -> Result<Sealed, EnvelopeError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        self.encrypt(&bytes).await
    }

    pub async fn open_json<T: DeserializeOwned>(&self, sealed: &Sealed) -> Result<T, EnvelopeError> {
        let bytes = self.decrypt(sealed).await?;
        // Never echo the payload in the error.
        serde_json::from_slice(&bytes).map_err(|e| {
            EnvelopeError::Malformed(format!("payload is not valid json ({:?})", e.classify()))
        })
    }
}
