//! Process-wide platform registry
//!
//! Populated once at start-up and read-only afterwards. Adding a platform
//! means adding an adapter and one `register` call.

use crate::opentable::{OpenTableClient, OpenTableConfig};
use crate::resy::{ResyClient, ResyConfig};
use crate::{BookingPlatform, PlatformError, PlatformResult};
use cierge_types::{Platform, PlatformCredentials};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds an adapter bound to one user's decrypted credentials.
pub type PlatformFactory = Arc<
    dyn Fn(PlatformCredentials) -> PlatformResult<Arc<dyn BookingPlatform>> + Send + Sync,
>;

#[derive(Clone, Default)]
pub struct PlatformRegistry {
    factories: HashMap<Platform, PlatformFactory>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the real adapters.
    pub fn with_defaults(resy: ResyConfig, opentable: OpenTableConfig) -> Self {
        let mut registry = Self::new();
        registry.register(
            Platform::Resy,
            Arc::new(move |credentials: PlatformCredentials| {
                let client = ResyClient::new(resy.clone(), credentials)?;
                Ok(Arc::new(client) as Arc<dyn BookingPlatform>)
            }),
        );
        registry.register(
            Platform::OpenTable,
            Arc::new(move |_credentials: PlatformCredentials| {
                Ok(Arc::new(OpenTableClient::new(opentable.clone())) as Arc<dyn BookingPlatform>)
            }),
        );
        registry
    }

    pub fn register(&mut self, platform: Platform, factory: PlatformFactory) -> &mut Self {
        self.factories.insert(platform, factory);
        self
    }

    pub fn build(
        &self,
        platform: Platform,
        credentials: PlatformCredentials,
    ) -> PlatformResult<Arc<dyn BookingPlatform>> {
        let factory = self
            .factories
            .get(&platform)
            .ok_or_else(|| PlatformError::Unsupported(platform.to_string()))?;
        factory(credentials)
    }

    pub fn supports(&self, platform: Platform) -> bool {
        self.factories.contains_key(&platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedPlatform;

    #[test]
    fn unregistered_platform_is_unsupported() {
        let registry = PlatformRegistry::new();
        let err = registry
            .build(Platform::Resy, PlatformCredentials::new("t"))
            .err()
            .unwrap();
        assert!(matches!(err, PlatformError::Unsupported(p) if p == "resy"));
    }

    #[test]
    fn factory_receives_credentials() {
        let scripted = Arc::new(ScriptedPlatform::new(Platform::Resy));
        let mut registry = PlatformRegistry::new();
        registry.register(Platform::Resy, scripted.factory());

        let adapter = registry
            .build(Platform::Resy, PlatformCredentials::new("user-token"))
            .unwrap();
        assert_eq!(adapter.platform(), Platform::Resy);
        assert_eq!(scripted.seen_tokens(), vec!["user-token".to_string()]);
        assert!(!registry.supports(Platform::OpenTable));
    }
}
