//! Fixtures shared by unit tests.

use chrono::Days;
use cierge_envelope::{Envelope, LocalKeyService};
use cierge_scheduler::{LocalScheduler, SchedulerBackend};
use cierge_types::Platform;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;

use crate::db;
use crate::entity::{restaurant, sea_orm_active_enums::PlatformKind};
use crate::secret::SecretHasher;
use crate::services::credentials::PutCredentials;
use crate::services::drop_configs::{CreateDropConfig, DropConfigView};
use crate::services::jobs::CreateJob;
use crate::services::restaurants::UpsertRestaurant;
use crate::services::{
    CredentialService, DropConfigService, JobService, JobSettings, RestaurantService,
};
use crate::time::today_in;

pub const NEW_YORK: &str = "America/New_York";

pub async fn memory_db() -> DatabaseConnection {
    db::connect("sqlite::memory:", Duration::from_secs(5))
        .await
        .expect("memory database")
}

pub async fn seed_restaurant(db: &DatabaseConnection, platform_id: &str) -> restaurant::Model {
    RestaurantService::new(db.clone())
        .upsert(UpsertRestaurant {
            platform: PlatformKind::Resy,
            platform_id: platform_id.to_string(),
            name: format!("Venue {}", platform_id),
            address: None,
            city: Some("New York".into()),
            state: Some("NY".into()),
            timezone: NEW_YORK.into(),
            rating: None,
        })
        .await
        .expect("seed restaurant")
}

pub fn test_envelope() -> Envelope {
    Envelope::new(Arc::new(
        LocalKeyService::generate("test-key-1").expect("local key"),
    ))
}

pub fn test_settings() -> JobSettings {
    JobSettings {
        cold_start_buffer: Duration::from_secs(60),
        submit_timeout: Duration::from_secs(10),
        server_endpoint: "http://127.0.0.1:9".into(),
        callback: false,
    }
}

/// Services over one memory database with a seeded restaurant, a 14 day
/// 09:00 drop config and stored resy credentials for `user-1`.
pub struct Harness {
    pub db: DatabaseConnection,
    pub envelope: Envelope,
    pub scheduler: Arc<LocalScheduler>,
    pub credentials: CredentialService,
    pub drop_configs: DropConfigService,
    pub jobs: JobService,
    pub restaurant: restaurant::Model,
    pub drop_config: DropConfigView,
}

pub async fn harness() -> Harness {
    let db = memory_db().await;
    let envelope = test_envelope();
    let scheduler = Arc::new(LocalScheduler::new());
    let credentials = CredentialService::new(db.clone(), envelope.clone(), scheduler.clone());
    let drop_configs = DropConfigService::new(db.clone());

    let restaurant = seed_restaurant(&db, "1505").await;
    let drop_config = drop_configs
        .create(CreateDropConfig {
            restaurant_id: restaurant.id.clone(),
            days_in_advance: 14,
            drop_time: "09:00".into(),
            timezone: NEW_YORK.into(),
        })
        .await
        .expect("drop config");
    credentials
        .put(
            "user-1",
            Platform::Resy,
            &PutCredentials {
                auth_token: "resy-auth-token".into(),
                refresh_token: None,
                payment_method_id: None,
                expires_at: None,
                refresh_expires_at: None,
            },
        )
        .await
        .expect("credentials");

    Harness {
        jobs: JobService::new(
            db.clone(),
            envelope.clone(),
            scheduler.clone(),
            credentials.clone(),
            cheap_hasher(),
            test_settings(),
        ),
        db,
        envelope,
        scheduler,
        credentials,
        drop_configs,
        restaurant,
        drop_config,
    }
}

fn cheap_hasher() -> SecretHasher {
    SecretHasher::with_cost(256, 1, 1).expect("argon2 params")
}

impl Harness {
    /// Two for 19:00 or 19:15, `days_ahead` days from today in New York.
    pub fn job_input(&self, days_ahead: u64) -> CreateJob {
        let tz = NEW_YORK.parse().expect("zone");
        CreateJob {
            restaurant_id: self.restaurant.id.clone(),
            drop_config_id: self.drop_config.id.clone(),
            reservation_date: today_in(tz) + Days::new(days_ahead),
            party_size: 2,
            preferred_times: vec!["19:00".into(), "19:15".into()],
        }
    }

    pub fn job_service_with(&self, scheduler: Arc<dyn SchedulerBackend>) -> JobService {
        self.job_service_with_settings(scheduler, test_settings())
    }

    pub fn job_service_with_settings(
        &self,
        scheduler: Arc<dyn SchedulerBackend>,
        settings: JobSettings,
    ) -> JobService {
        let credentials =
            CredentialService::new(self.db.clone(), self.envelope.clone(), scheduler.clone());
        JobService::new(
            self.db.clone(),
            self.envelope.clone(),
            scheduler,
            credentials,
            cheap_hasher(),
            settings,
        )
    }
}
