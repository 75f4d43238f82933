use cierge_envelope::{Envelope, EnvelopeError, KeyService, KmsConfig, KmsKeyService, LocalKeyService};
use cierge_platform::opentable::OpenTableConfig;
use cierge_platform::resy::ResyConfig;
use cierge_platform::{PlatformRegistry, PollPolicy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the worker
#[derive(Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Timeout for the status callback (milliseconds)
    #[serde(default = "default_callback_timeout_ms")]
    pub callback_timeout_ms: u64,
    /// Timeout for platform HTTP requests (milliseconds)
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    /// Delay between inventory searches once the drop has passed (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long after the drop to keep searching (seconds)
    #[serde(default = "default_poll_window_secs")]
    pub poll_window_secs: u64,
    #[serde(default = "default_kms_provider")]
    pub kms_provider: String,
    #[serde(default)]
    pub kms_key_id: String,
    /// `kid:base64` key list for the local key service
    #[serde(default, skip_serializing)]
    pub kms_local_keys: String,
    #[serde(default = "default_resy_base_url")]
    pub resy_base_url: String,
    #[serde(default, skip_serializing)]
    pub resy_api_key: String,
    #[serde(default = "default_opentable_base_url")]
    pub opentable_base_url: String,
}

fn default_callback_timeout_ms() -> u64 {
    30_000
}
fn default_http_timeout_ms() -> u64 {
    20_000
}
fn default_poll_interval_ms() -> u64 {
    50
}
fn default_poll_window_secs() -> u64 {
    30
}
fn default_kms_provider() -> String {
    "local".to_string()
}
fn default_resy_base_url() -> String {
    "https://api.resy.com".to_string()
}
fn default_opentable_base_url() -> String {
    "https://www.opentable.com".to_string()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            callback_timeout_ms: default_callback_timeout_ms(),
            http_timeout_ms: default_http_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_window_secs: default_poll_window_secs(),
            kms_provider: default_kms_provider(),
            kms_key_id: String::new(),
            kms_local_keys: String::new(),
            resy_base_url: default_resy_base_url(),
            resy_api_key: String::new(),
            opentable_base_url: default_opentable_base_url(),
        }
    }
}

impl std::fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("callback_timeout_ms", &self.callback_timeout_ms)
            .field("http_timeout_ms", &self.http_timeout_ms)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("poll_window_secs", &self.poll_window_secs)
            .field("kms_provider", &self.kms_provider)
            .field("kms_key_id", &self.kms_key_id)
            .field("resy_base_url", &self.resy_base_url)
            .field("opentable_base_url", &self.opentable_base_url)
            .finish_non_exhaustive()
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self {
            callback_timeout_ms: std::env::var("CIERGE_WORKER_CALLBACK_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_callback_timeout_ms),
            http_timeout_ms: std::env::var("CIERGE_WORKER_HTTP_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_http_timeout_ms),
            poll_interval_ms: std::env::var("CIERGE_WORKER_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_poll_interval_ms),
            poll_window_secs: std::env::var("CIERGE_WORKER_POLL_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_poll_window_secs),
            kms_provider: std::env::var("CIERGE_KMS_PROVIDER")
                .unwrap_or_else(|_| default_kms_provider()),
            kms_key_id: std::env::var("CIERGE_KMS_KEY_ID").unwrap_or_default(),
            kms_local_keys: std::env::var("CIERGE_KMS_LOCAL_KEYS").unwrap_or_default(),
            resy_base_url: std::env::var("CIERGE_RESY_BASE_URL")
                .unwrap_or_else(|_| default_resy_base_url()),
            resy_api_key: std::env::var("CIERGE_RESY_API_KEY").unwrap_or_default(),
            opentable_base_url: std::env::var("CIERGE_OPENTABLE_BASE_URL")
                .unwrap_or_else(|_| default_opentable_base_url()),
        }
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_millis(self.callback_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            window: Duration::from_secs(self.poll_window_secs),
        }
    }

    /// Registry with the real platform adapters.
    pub fn registry(&self) -> PlatformRegistry {
        let resy = ResyConfig {
            base_url: self.resy_base_url.clone(),
            api_key: self.resy_api_key.clone(),
            timeout: self.http_timeout(),
        };
        let opentable = OpenTableConfig {
            base_url: self.opentable_base_url.clone(),
        };
        PlatformRegistry::with_defaults(resy, opentable)
    }

    /// Key service selected by `kms_provider`.
    pub async fn envelope(&self) -> Result<Envelope, EnvelopeError> {
        if self.kms_key_id.is_empty() {
            return Err(EnvelopeError::Config("CIERGE_KMS_KEY_ID not set".into()));
        }
        let service: Arc<dyn KeyService> = match self.kms_provider.to_lowercase().as_str() {
            "aws" | "kms" => Arc::new(KmsKeyService::new(KmsConfig::new(&self.kms_key_id)).await),
            _ => Arc::new(LocalKeyService::from_spec(
                &self.kms_key_id,
                &self.kms_local_keys,
            )?),
        };
        Ok(Envelope::new(service))
    }
}
