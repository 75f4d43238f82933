//! Platform credentials
//!
//! Stores each user's platform credential bundle sealed by the envelope and
//! keeps scheduled drop events carrying the current ciphertext. Plaintext
//! exists only transiently in memory while sealing.

use chrono::{DateTime, Utc};
use cierge_envelope::Envelope;
use cierge_scheduler::{SchedulerBackend, SchedulerError};
use cierge_types::{Platform, PlatformCredentials, Sealed};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{ServiceError, ServiceResult, new_id, now};
use crate::entity::{
    job, platform_token,
    sea_orm_active_enums::{JobStatus, PlatformKind},
};

/// Request body for storing credentials; never logged.
#[derive(Clone, Deserialize)]
pub struct PutCredentials {
    pub auth_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub payment_method_id: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for PutCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PutCredentials")
            .field("auth_token", &"<redacted>")
            .field("has_refresh", &self.refresh_token.is_some())
            .field("payment_method_id", &self.payment_method_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl From<&PutCredentials> for PlatformCredentials {
    fn from(input: &PutCredentials) -> Self {
        PlatformCredentials {
            auth_token: input.auth_token.clone(),
            refresh_token: input.refresh_token.clone(),
            payment_method_id: input.payment_method_id,
            expires_at: input.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformTokenView {
    pub id: String,
    pub platform: PlatformKind,
    pub expires_at: Option<DateTime<Utc>>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
    pub has_refresh: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<platform_token::Model> for PlatformTokenView {
    fn from(row: platform_token::Model) -> Self {
        Self {
            id: row.id,
            platform: row.platform,
            expires_at: row.expires_at.map(|t| t.and_utc()),
            refresh_expires_at: row.refresh_expires_at.map(|t| t.and_utc()),
            has_refresh: row.has_refresh,
            created_at: row.created_at.and_utc(),
            updated_at: row.updated_at.and_utc(),
        }
    }
}

#[derive(Clone)]
pub struct CredentialService {
    db: DatabaseConnection,
    envelope: Envelope,
    scheduler: Arc<dyn SchedulerBackend>,
}

impl CredentialService {
    pub fn new(db: DatabaseConnection, envelope: Envelope, scheduler: Arc<dyn SchedulerBackend>) -> Self {
        Self {
            db,
            envelope,
            scheduler,
        }
    }

    /// Seal and store a user's credentials, replacing any previous bundle
    /// for the platform, then refresh the user's pending drop events.
    pub async fn put(
        &self,
        user_id: &str,
        platform: Platform,
        input: &PutCredentials,
    ) -> ServiceResult<PlatformTokenView> {
        if input.auth_token.trim().is_empty() {
            return Err(ServiceError::validation("auth_token must not be empty"));
        }
        let credentials = PlatformCredentials::from(input);
        let sealed = self.envelope.seal_json(&credentials).await?;
        let kind = PlatformKind::from(platform);

        let txn = self.db.begin().await?;
        platform_token::Entity::delete_many()
            .filter(platform_token::Column::UserId.eq(user_id))
            .filter(platform_token::Column::Platform.eq(kind))
            .exec(&txn)
            .await?;
        let now = now();
        let row = platform_token::ActiveModel {
            id: Set(new_id()),
            user_id: Set(user_id.to_string()),
            platform: Set(kind),
            encrypted_token: Set(sealed.into_inner()),
            expires_at: Set(input.expires_at.map(|t| t.naive_utc())),
            refresh_expires_at: Set(input.refresh_expires_at.map(|t| t.naive_utc())),
            has_refresh: Set(input.refresh_token.is_some()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;

        tracing::info!(user_id = %user_id, platform = %platform, "Platform credentials stored");
        let refreshed = self.reinject(user_id, platform).await?;
        if refreshed > 0 {
            tracing::info!(user_id = %user_id, platform = %platform, jobs = refreshed, "Re-injected credentials into scheduled jobs");
        }
        Ok(row.into())
    }

    pub async fn list(&self, user_id: &str) -> ServiceResult<Vec<PlatformTokenView>> {
        Ok(platform_token::Entity::find()
            .filter(platform_token::Column::UserId.eq(user_id))
            .order_by_asc(platform_token::Column::Platform)
            .all(&self.db)
            .await?
            .into_iter()
            .map(PlatformTokenView::from)
            .collect())
    }

    async fn find(&self, user_id: &str, platform: Platform) -> ServiceResult<platform_token::Model> {
        platform_token::Entity::find()
            .filter(platform_token::Column::UserId.eq(user_id))
            .filter(platform_token::Column::Platform.eq(PlatformKind::from(platform)))
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("no {} credentials on file", platform)))
    }

    /// Fresh ciphertext of the stored bundle under the active key, for
    /// embedding into a drop event.
    pub async fn encrypt_for_job(&self, user_id: &str, platform: Platform) -> ServiceResult<Sealed> {
        let row = self.find(user_id, platform).await?;
        Ok(self.envelope.reencrypt(&Sealed::new(row.encrypted_token)).await?)
    }

    /// Re-seal the stored bundle under the active key and push it into every
    /// pending drop event for the pair. Returns how many events were updated.
    pub async fn rotate(&self, user_id: &str, platform: Platform) -> ServiceResult<usize> {
        let row = self.find(user_id, platform).await?;
        let resealed = self
            .envelope
            .reencrypt(&Sealed::new(row.encrypted_token.clone()))
            .await?;

        let mut active: platform_token::ActiveModel = row.into();
        active.encrypted_token = Set(resealed.into_inner());
        active.updated_at = Set(now());
        active.update(&self.db).await?;
        tracing::info!(user_id = %user_id, platform = %platform, key_id = %self.envelope.key_id(), "Platform credentials rotated");

        self.reinject(user_id, platform).await
    }

    /// Rotate every stored bundle whose access or refresh expiry falls
    /// within `horizon`. A bundle is rotated once per window: rows updated
    /// after entering it are skipped. Returns how many bundles were rotated.
    pub async fn rotate_expiring(&self, horizon: Duration) -> ServiceResult<usize> {
        let horizon = chrono::Duration::from_std(horizon)
            .map_err(|_| ServiceError::validation("rotation horizon out of range"))?;
        let cutoff = now() + horizon;
        let candidates = platform_token::Entity::find()
            .filter(
                Condition::any()
                    .add(platform_token::Column::ExpiresAt.lte(cutoff))
                    .add(platform_token::Column::RefreshExpiresAt.lte(cutoff)),
            )
            .all(&self.db)
            .await?;

        let mut rotated = 0;
        for row in candidates {
            let Some(expiry) = [row.expires_at, row.refresh_expires_at].into_iter().flatten().min() else {
                continue;
            };
            if row.updated_at >= expiry - horizon {
                continue;
            }
            let platform = Platform::from(row.platform);
            tracing::info!(user_id = %row.user_id, platform = %platform, expires_at = %expiry.and_utc(), "Platform credentials near expiry");
            match self.rotate(&row.user_id, platform).await {
                Ok(_) => rotated += 1,
                Err(e) => {
                    tracing::warn!(user_id = %row.user_id, platform = %platform, error = %e, "Expiry rotation failed");
                }
            }
        }
        Ok(rotated)
    }

    /// Run [`Self::rotate_expiring`] every `interval` until `shutdown`.
    pub fn spawn_expiry_sweep(
        &self,
        interval: Duration,
        horizon: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match service.rotate_expiring(horizon).await {
                            Ok(0) => {}
                            Ok(rotated) => tracing::info!(rotated, "Credential expiry sweep"),
                            Err(e) => tracing::warn!(error = %e, "Credential expiry sweep failed"),
                        }
                    }
                }
            }
        })
    }

    async fn reinject(&self, user_id: &str, platform: Platform) -> ServiceResult<usize> {
        let pending = job::Entity::find()
            .filter(job::Column::UserId.eq(user_id))
            .filter(job::Column::Platform.eq(PlatformKind::from(platform)))
            .filter(job::Column::Status.eq(JobStatus::Scheduled))
            .filter(job::Column::ScheduledAt.gt(now()))
            .all(&self.db)
            .await?;

        let mut updated = 0;
        for row in pending {
            let Ok(job_id) = Uuid::parse_str(&row.id) else {
                tracing::error!(job_id = %row.id, "Job id is not a uuid");
                continue;
            };
            let sealed = self.encrypt_for_job(user_id, platform).await?;
            match self.scheduler.update_credentials(job_id, sealed).await {
                Ok(()) => updated += 1,
                Err(SchedulerError::NotFound(_)) => {
                    tracing::warn!(job_id = %job_id, "Scheduled job has no scheduler entry");
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Could not update scheduled credentials");
                }
            }
        }
        Ok(updated)
    }
}
