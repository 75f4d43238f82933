//! AWS KMS key service
//!
//! Encrypts directly under a symmetric KMS key. The ciphertext blob returned
//! by KMS already names its key, so decryption needs no key id.

use crate::{EnvelopeError, KeyService};
use std::time::Duration;

/// Hard cap on a single KMS roundtrip.
const KMS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct KmsConfig {
    /// Key id, ARN or alias new ciphertexts are bound to
    pub key_id: String,
    pub timeout: Duration,
}

impl KmsConfig {
    pub fn new(key_id: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            timeout: KMS_TIMEOUT,
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, EnvelopeError> {
        let key_id = std::env::var("CIERGE_KMS_KEY_ID")
            .map_err(|_| EnvelopeError::Config("CIERGE_KMS_KEY_ID not set".into()))?;
        Ok(Self::new(key_id))
    }
}

#[cfg(feature = "aws")]
pub struct KmsKeyService {
    config: KmsConfig,
    client: aws_sdk_kms::Client,
}

#[cfg(not(feature = "aws"))]
pub struct KmsKeyService {
    config: KmsConfig,
}

#[cfg(feature = "aws")]
impl KmsKeyService {
    pub async fn new(config: KmsConfig) -> Self {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = aws_sdk_kms::Client::new(&aws_config);
        Self { config, client }
    }

    pub fn with_client(config: KmsConfig, client: aws_sdk_kms::Client) -> Self {
        Self { config, client }
    }
}

#[cfg(not(feature = "aws"))]
impl KmsKeyService {
    pub async fn new(config: KmsConfig) -> Self {
        Self { config }
    }
}

#[cfg(feature = "aws")]
#[async_trait::async_trait]
impl KeyService for KmsKeyService {
    fn key_id(&self) -> &str {
        &self.config.key_id
    }

    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        use aws_sdk_kms::primitives::Blob;

        let request = self
            .client
            .encrypt()
            .key_id(&self.config.key_id)
            .plaintext(Blob::new(plaintext.to_vec()))
            .send();

        let response = tokio::time::timeout(self.config.timeout, request)
            .await
            .map_err(|_| EnvelopeError::Transient("KMS encrypt timed out".into()))?
            .map_err(|e| EnvelopeError::Transient(format!("AWS SDK error: {}", e)))?;

        let blob = response
            .ciphertext_blob
            .ok_or_else(|| EnvelopeError::Transient("KMS returned no ciphertext".into()))?;

        tracing::debug!(key_id = %self.config.key_id, "Encrypted payload with KMS");
        Ok(blob.into_inner())
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        use aws_sdk_kms::primitives::Blob;

        let request = self
            .client
            .decrypt()
            .ciphertext_blob(Blob::new(ciphertext.to_vec()))
            .send();

        let response = match tokio::time::timeout(self.config.timeout, request).await {
            Err(_) => return Err(EnvelopeError::Transient("KMS decrypt timed out".into())),
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let inauthentic = e.as_service_error().is_some_and(|se| {
                    se.is_invalid_ciphertext_exception() || se.is_incorrect_key_exception()
                });
                if inauthentic {
                    return Err(EnvelopeError::Inauthentic);
                }
                return Err(EnvelopeError::Transient(format!("AWS SDK error: {}", e)));
            }
        };

        response
            .plaintext
            .map(|blob| blob.into_inner())
            .ok_or_else(|| EnvelopeError::Transient("KMS returned no plaintext".into()))
    }
}

// Stub implementation when AWS feature is disabled
#[cfg(not(feature = "aws"))]
#[async_trait::async_trait]
impl KeyService for KmsKeyService {
    fn key_id(&self) -> &str {
        &self.config.key_id
    }

    async fn encrypt(&self, _plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        tracing::warn!(key_id = %self.config.key_id, "AWS feature not enabled");
        Err(EnvelopeError::Config(
            "AWS feature not enabled. Compile with --features aws".into(),
        ))
    }

    async fn decrypt(&self, _ciphertext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        tracing::warn!(key_id = %self.config.key_id, "AWS feature not enabled");
        Err(EnvelopeError::Config("AWS feature not enabled".into()))
    }
}
