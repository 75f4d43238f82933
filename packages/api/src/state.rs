use cierge_envelope::Envelope;
use cierge_scheduler::SchedulerBackend;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::auth::AccessTokens;
use crate::config::ServerConfig;
use crate::middleware::rate_limit::RateLimiter;
use crate::secret::SecretHasher;
use crate::services::{
    CredentialService, DropConfigService, JobService, JobSettings, RestaurantService, ServiceResult,
};
use crate::token_store::TokenStore;

pub type AppState = Arc<State>;

pub struct State {
    pub config: ServerConfig,
    pub db: DatabaseConnection,
    pub access: AccessTokens,
    pub envelope: Envelope,
    pub scheduler: Arc<dyn SchedulerBackend>,
    pub jobs: JobService,
    pub credentials: CredentialService,
    pub drop_configs: DropConfigService,
    pub restaurants: RestaurantService,
    pub job_rate_limiter: RateLimiter,
}

impl State {
    pub fn new(
        config: ServerConfig,
        db: DatabaseConnection,
        tokens: TokenStore,
        envelope: Envelope,
        scheduler: Arc<dyn SchedulerBackend>,
    ) -> ServiceResult<Self> {
        Ok(Self::with_hasher(
            config,
            db,
            tokens,
            envelope,
            scheduler,
            SecretHasher::new()?,
        ))
    }

    /// Same as [`State::new`] with a custom callback secret hasher.
    pub fn with_hasher(
        config: ServerConfig,
        db: DatabaseConnection,
        tokens: TokenStore,
        envelope: Envelope,
        scheduler: Arc<dyn SchedulerBackend>,
        hasher: SecretHasher,
    ) -> Self {
        let access = AccessTokens::new(
            &config.auth.jwt_secret,
            tokens,
            config.auth.access_token_expiry,
        );
        let credentials = CredentialService::new(db.clone(), envelope.clone(), scheduler.clone());
        let jobs = JobService::new(
            db.clone(),
            envelope.clone(),
            scheduler.clone(),
            credentials.clone(),
            hasher,
            JobSettings::from_config(&config),
        );
        let job_rate_limiter = RateLimiter::new(config.rate_limit.requests, config.rate_limit.window);

        Self {
            drop_configs: DropConfigService::new(db.clone()),
            restaurants: RestaurantService::new(db.clone()),
            access,
            envelope,
            scheduler,
            jobs,
            credentials,
            job_rate_limiter,
            db,
            config,
        }
    }
}
