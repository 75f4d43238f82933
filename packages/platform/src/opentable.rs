//! OpenTable adapter stub. Registered so jobs can name the platform; every
//! capability reports `Unsupported`.

use crate::{BookingAttempt, BookingPlatform, BookingRequest, PlatformError, PlatformResult, Slot};
use cierge_types::Platform;

#[derive(Debug, Clone)]
pub struct OpenTableConfig {
    pub base_url: String,
}

impl Default for OpenTableConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.opentable.com".to_string(),
        }
    }
}

pub struct OpenTableClient {
    config: OpenTableConfig,
}

impl OpenTableClient {
    pub fn new(config: OpenTableConfig) -> Self {
        Self { config }
    }

    fn unsupported<T>(&self, capability: &str) -> PlatformResult<T> {
        tracing::warn!(base_url = %self.config.base_url, capability, "OpenTable adapter is not implemented");
        Err(PlatformError::Unsupported(Platform::OpenTable.to_string()))
    }
}

#[async_trait::async_trait]
impl BookingPlatform for OpenTableClient {
    fn platform(&self) -> Platform {
        Platform::OpenTable
    }

    async fn pre_check(&self, _request: &BookingRequest) -> PlatformResult<()> {
        self.unsupported("pre_check")
    }

    async fn search(&self, _request: &BookingRequest) -> PlatformResult<Vec<Slot>> {
        self.unsupported("search")
    }

    async fn book(&self, _request: &BookingRequest, _slot: &Slot) -> PlatformResult<BookingAttempt> {
        self.unsupported("book")
    }

    async fn cancel(&self, _confirmation: &serde_json::Value) -> PlatformResult<()> {
        self.unsupported("cancel")
    }
}
