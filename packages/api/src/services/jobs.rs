//! Job lifecycle: create, cancel and reconcile a worker's outcome.
//!
//! Status only moves forward along `scheduled -> running -> {success, failed}`
//! or `scheduled -> cancelled`. Every transition is a conditional update on
//! the prior status so concurrent writers cannot clobber each other.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use cierge_envelope::Envelope;
use cierge_scheduler::SchedulerBackend;
use cierge_types::{DropEvent, Outcome, Platform, Sealed, format_wall_time, parse_wall_time};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::drop_configs::record_success;
use super::{CredentialService, ServiceError, ServiceResult, new_id, now};
use crate::config::ServerConfig;
use crate::entity::{
    drop_config, drop_config_restaurant, job, reservation, restaurant,
    sea_orm_active_enums::JobStatus,
};
use crate::secret::{SecretHasher, generate_secret};
use crate::time::{local_instant, parse_timezone, scheduled_at, today_in};

pub const MIN_PARTY_SIZE: i32 = 1;
pub const MAX_PARTY_SIZE: i32 = 20;

const CLAIM_POLL: Duration = Duration::from_millis(20);
const CLAIM_SLACK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Lead time subtracted from the drop instant when scheduling
    pub cold_start_buffer: Duration,
    pub submit_timeout: Duration,
    /// Public base URL the worker reports back to
    pub server_endpoint: String,
    pub callback: bool,
}

impl JobSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            cold_start_buffer: config.scheduler.cold_start_buffer,
            submit_timeout: config.scheduler.submit_timeout,
            server_endpoint: config.server.endpoint.clone(),
            callback: config.worker.callback,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateJob {
    pub restaurant_id: String,
    pub drop_config_id: String,
    pub reservation_date: NaiveDate,
    pub party_size: i32,
    pub preferred_times: Vec<String>,
}

/// Job as returned by the API. Never carries the callback secret hash.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: String,
    pub user_id: String,
    pub restaurant_id: String,
    pub platform: Platform,
    pub reservation_date: NaiveDate,
    pub party_size: i32,
    pub preferred_times: serde_json::Value,
    pub scheduled_at: DateTime<Utc>,
    pub drop_config_id: Option<String>,
    pub callbacked: bool,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub reserved_time: Option<String>,
    pub confirmation: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub logs: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<job::Model> for JobView {
    fn from(row: job::Model) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            restaurant_id: row.restaurant_id,
            platform: row.platform.into(),
            reservation_date: row.reservation_date,
            party_size: row.party_size,
            preferred_times: row.preferred_times,
            scheduled_at: row.scheduled_at.and_utc(),
            drop_config_id: row.drop_config_id,
            callbacked: row.callbacked,
            status: row.status,
            started_at: row.started_at.map(|t| t.and_utc()),
            completed_at: row.completed_at.map(|t| t.and_utc()),
            reserved_time: row.reserved_time,
            confirmation: row.confirmation,
            error_message: row.error_message,
            logs: row.logs,
            created_at: row.created_at.and_utc(),
            updated_at: row.updated_at.and_utc(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReservationView {
    pub id: String,
    pub job_id: String,
    pub restaurant_id: String,
    pub platform: Platform,
    pub confirmation: serde_json::Value,
    pub reservation_at: DateTime<Utc>,
    pub party_size: i32,
    pub created_at: DateTime<Utc>,
}

impl From<reservation::Model> for ReservationView {
    fn from(row: reservation::Model) -> Self {
        Self {
            id: row.id,
            job_id: row.job_id,
            restaurant_id: row.restaurant_id,
            platform: row.platform.into(),
            confirmation: row.confirmation,
            reservation_at: row.reservation_at.and_utc(),
            party_size: row.party_size,
            created_at: row.created_at.and_utc(),
        }
    }
}

#[derive(Clone)]
pub struct JobService {
    db: DatabaseConnection,
    envelope: Envelope,
    scheduler: Arc<dyn SchedulerBackend>,
    credentials: CredentialService,
    hasher: SecretHasher,
    settings: JobSettings,
}

impl JobService {
    pub fn new(
        db: DatabaseConnection,
        envelope: Envelope,
        scheduler: Arc<dyn SchedulerBackend>,
        credentials: CredentialService,
        hasher: SecretHasher,
        settings: JobSettings,
    ) -> Self {
        Self {
            db,
            envelope,
            scheduler,
            credentials,
            hasher,
            settings,
        }
    }

    /// Validate, persist and schedule a job. Persistence and scheduling share
    /// one transaction: if the scheduler refuses, no row is left behind.
    pub async fn create(&self, user_id: &str, input: CreateJob) -> ServiceResult<JobView> {
        if !(MIN_PARTY_SIZE..=MAX_PARTY_SIZE).contains(&input.party_size) {
            return Err(ServiceError::validation(format!(
                "party_size must be between {} and {}",
                MIN_PARTY_SIZE, MAX_PARTY_SIZE
            )));
        }
        let preferred_times = normalize_preferred_times(&input.preferred_times)?;

        let restaurant = restaurant::Entity::find_by_id(input.restaurant_id.clone())
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::not_found(format!("restaurant {} not found", input.restaurant_id))
            })?;
        let platform = Platform::from(restaurant.platform);
        let tz = parse_timezone(&restaurant.timezone)?;

        let today = today_in(tz);
        if input.reservation_date < today {
            return Err(ServiceError::validation("reservation_date is in the past"));
        }
        let horizon = today
            .checked_add_days(Days::new(platform.max_lead_days() as u64))
            .unwrap_or(NaiveDate::MAX);
        if input.reservation_date > horizon {
            return Err(ServiceError::validation(format!(
                "reservation_date is more than {} days ahead",
                platform.max_lead_days()
            )));
        }

        let config = drop_config::Entity::find_by_id(input.drop_config_id.clone())
            .one(&self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::not_found(format!("drop config {} not found", input.drop_config_id))
            })?;
        let attached = drop_config_restaurant::Entity::find_by_id((
            config.id.clone(),
            restaurant.id.clone(),
        ))
        .one(&self.db)
        .await?
        .is_some();
        if !attached {
            return Err(ServiceError::validation(
                "drop config does not belong to the restaurant",
            ));
        }

        let drop_time = parse_wall_time(&config.drop_time)
            .map_err(|e| ServiceError::internal(format!("stored drop time: {}", e)))?;
        let days_in_advance = u32::try_from(config.days_in_advance)
            .map_err(|_| ServiceError::internal("stored days_in_advance is negative"))?;
        let drop_at = scheduled_at(input.reservation_date, days_in_advance, drop_time, tz)?;
        if drop_at <= Utc::now() {
            return Err(ServiceError::validation(format!(
                "the drop for {} has already happened",
                input.reservation_date
            )));
        }

        let encrypted_token = match self.credentials.encrypt_for_job(user_id, platform).await {
            Ok(sealed) => sealed,
            Err(ServiceError::NotFound(_)) => {
                return Err(ServiceError::validation(format!(
                    "no {} credentials on file",
                    platform
                )));
            }
            Err(e) => return Err(e),
        };

        let secret = generate_secret();
        let secret_hash = self.hasher.hash_blocking(secret.clone()).await?;
        let encrypted_callback_secret = self.envelope.encrypt(secret.as_bytes()).await?;
        drop(secret);

        let job_id = Uuid::new_v4();
        let event = DropEvent {
            job_id,
            platform,
            platform_venue_id: restaurant.platform_id.clone(),
            encrypted_token,
            encrypted_callback_secret,
            reservation_date: input.reservation_date,
            party_size: input.party_size as u32,
            preferred_times: preferred_times.clone(),
            drop_time: drop_at,
            server_endpoint: self.settings.server_endpoint.clone(),
            callback: self.settings.callback,
        };
        let fire_at = self.fire_at(drop_at);

        let now = now();
        let txn = self.db.begin().await?;
        let row = job::ActiveModel {
            id: Set(job_id.to_string()),
            user_id: Set(user_id.to_string()),
            restaurant_id: Set(restaurant.id.clone()),
            platform: Set(restaurant.platform),
            reservation_date: Set(input.reservation_date),
            party_size: Set(input.party_size),
            preferred_times: Set(serde_json::json!(preferred_times)),
            scheduled_at: Set(drop_at.naive_utc()),
            drop_config_id: Set(Some(config.id.clone())),
            callback_secret_hash: Set(secret_hash),
            callbacked: Set(false),
            status: Set(JobStatus::Scheduled),
            started_at: Set(None),
            completed_at: Set(None),
            reserved_time: Set(None),
            confirmation: Set(None),
            error_message: Set(None),
            logs: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        match tokio::time::timeout(
            self.settings.submit_timeout,
            self.scheduler.schedule(&event, fire_at),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                txn.rollback().await?;
                tracing::warn!(job_id = %job_id, error = %e, "Scheduling failed, job discarded");
                return Err(e.into());
            }
            Err(_) => {
                txn.rollback().await?;
                // The submission may still land; make sure it never fires.
                if let Err(e) = self.scheduler.cancel(job_id).await {
                    tracing::warn!(job_id = %job_id, error = %e, "Cleanup of timed out schedule failed");
                }
                tracing::warn!(job_id = %job_id, "Scheduling timed out, job discarded");
                return Err(ServiceError::Dependency("scheduler timed out".to_string()));
            }
        }

        if let Err(e) = txn.commit().await {
            if let Err(cancel_err) = self.scheduler.cancel(job_id).await {
                tracing::error!(job_id = %job_id, error = %cancel_err, "Schedule left behind for a job that was not persisted");
            }
            return Err(e.into());
        }

        tracing::info!(
            job_id = %job_id,
            user_id = %user_id,
            platform = %platform,
            scheduled_at = %drop_at,
            fire_at = %fire_at,
            "Job scheduled"
        );
        Ok(row.into())
    }

    fn fire_at(&self, drop_at: DateTime<Utc>) -> DateTime<Utc> {
        let buffer = chrono::Duration::from_std(self.settings.cold_start_buffer)
            .unwrap_or(chrono::Duration::zero());
        (drop_at - buffer).max(Utc::now()).min(drop_at)
    }

    pub async fn get(&self, user_id: &str, job_id: &str) -> ServiceResult<JobView> {
        self.find_owned(user_id, job_id).await.map(JobView::from)
    }

    async fn find_owned(&self, user_id: &str, job_id: &str) -> ServiceResult<job::Model> {
        job::Entity::find_by_id(job_id.to_string())
            .filter(job::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("job {} not found", job_id)))
    }

    /// Jobs of a user. `upcoming` keeps only jobs that have not finished,
    /// soonest drop first; otherwise newest first.
    pub async fn list(&self, user_id: &str, upcoming: bool) -> ServiceResult<Vec<JobView>> {
        let query = job::Entity::find().filter(job::Column::UserId.eq(user_id));
        let query = if upcoming {
            query
                .filter(job::Column::Status.is_in(JobStatus::reportable()))
                .order_by_asc(job::Column::ScheduledAt)
        } else {
            query.order_by_desc(job::Column::CreatedAt)
        };
        Ok(query
            .all(&self.db)
            .await?
            .into_iter()
            .map(JobView::from)
            .collect())
    }

    pub async fn list_reservations(&self, user_id: &str) -> ServiceResult<Vec<ReservationView>> {
        Ok(reservation::Entity::find()
            .filter(reservation::Column::UserId.eq(user_id))
            .order_by_asc(reservation::Column::ReservationAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(ReservationView::from)
            .collect())
    }

    /// Cancel a scheduled job. The status flip is authoritative; a failing
    /// scheduler cancel is only logged.
    pub async fn cancel(&self, user_id: &str, job_id: &str) -> ServiceResult<JobView> {
        let flipped = job::Entity::update_many()
            .col_expr(job::Column::Status, Expr::value(JobStatus::Cancelled))
            .col_expr(job::Column::UpdatedAt, Expr::value(now()))
            .filter(job::Column::Id.eq(job_id))
            .filter(job::Column::UserId.eq(user_id))
            .filter(job::Column::Status.eq(JobStatus::Scheduled))
            .exec(&self.db)
            .await?;

        let row = self.find_owned(user_id, job_id).await?;
        if flipped.rows_affected == 0 {
            return Err(ServiceError::Conflict(format!(
                "job is {:?}, only scheduled jobs can be cancelled",
                row.status
            )));
        }

        match Uuid::parse_str(job_id) {
            Ok(id) => {
                if let Err(e) = self.scheduler.cancel(id).await {
                    tracing::warn!(job_id = %job_id, error = %e, "Scheduler cancel failed, job stays cancelled");
                }
            }
            Err(_) => tracing::error!(job_id = %job_id, "Job id is not a uuid"),
        }
        tracing::info!(job_id = %job_id, user_id = %user_id, "Job cancelled");
        Ok(row.into())
    }

    /// Move a job the scheduler just fired from `scheduled` to `running`.
    /// Returns false when the job was no longer scheduled.
    pub async fn mark_running(&self, job_id: Uuid) -> ServiceResult<bool> {
        let result = job::Entity::update_many()
            .col_expr(job::Column::Status, Expr::value(JobStatus::Running))
            .col_expr(job::Column::UpdatedAt, Expr::value(now()))
            .filter(job::Column::Id.eq(job_id.to_string()))
            .filter(job::Column::Status.eq(JobStatus::Scheduled))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// [`Self::mark_running`] for an event the local scheduler fired. A drop
    /// inside the cold start buffer fires while `create` still holds its
    /// transaction, so a missing row is polled for until it commits or the
    /// submit timeout elapses. A row in any other status is final.
    pub async fn claim_fired(&self, job_id: Uuid) -> ServiceResult<bool> {
        let deadline = tokio::time::Instant::now() + self.settings.submit_timeout + CLAIM_SLACK;
        loop {
            if self.mark_running(job_id).await? {
                return Ok(true);
            }
            let exists = job::Entity::find_by_id(job_id.to_string())
                .one(&self.db)
                .await?
                .is_some();
            if exists {
                return Ok(false);
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(job_id = %job_id, "Fired job never appeared");
                return Ok(false);
            }
            tokio::time::sleep(CLAIM_POLL).await;
        }
    }

    /// Authenticate a worker's report: the job must exist, `secret` must
    /// match its stored hash and no report may have been accepted yet.
    /// Unknown jobs and bad secrets are indistinguishable to the caller.
    pub async fn authenticate_callback(&self, job_id: &str, secret: &str) -> ServiceResult<job::Model> {
        let Some(row) = job::Entity::find_by_id(job_id.to_string())
            .one(&self.db)
            .await?
        else {
            tracing::warn!(job_id = %job_id, "Callback for unknown job");
            return Err(ServiceError::Unauthorized("invalid callback credentials".into()));
        };

        let verified = self
            .hasher
            .verify_blocking(secret.to_string(), row.callback_secret_hash.clone())
            .await;
        if !verified {
            tracing::warn!(job_id = %job_id, "Callback secret mismatch");
            return Err(ServiceError::Unauthorized("invalid callback credentials".into()));
        }

        if row.callbacked {
            tracing::info!(job_id = %job_id, "Duplicate callback rejected");
            return Err(ServiceError::Forbidden("job already reported".into()));
        }
        Ok(row)
    }

    /// Apply a worker outcome to an authenticated job exactly once.
    pub async fn reconcile(&self, row: &job::Model, outcome: &Outcome) -> ServiceResult<JobView> {
        if outcome.job_id.to_string() != row.id {
            return Err(ServiceError::Unauthorized("job id mismatch".into()));
        }
        if outcome.duration < 0 {
            return Err(ServiceError::validation("duration must not be negative"));
        }

        let started_at = outcome.start_time;
        let completed_at = outcome.completed_at();
        let logs = serde_json::to_string(outcome)
            .map_err(|e| ServiceError::internal(format!("serialize outcome: {}", e)))?;
        let reserved_time = outcome
            .reservation_time
            .filter(|_| outcome.success)
            .map(|at| format_wall_time(at.time()));
        let (status, error_message) = if outcome.success {
            (JobStatus::Success, None)
        } else {
            let message = if outcome.error_message.is_empty() {
                outcome.error.clone().unwrap_or_else(|| "unknown error".into())
            } else {
                outcome.error_message.clone()
            };
            (JobStatus::Failed, Some(message))
        };
        let confirmation = outcome
            .success
            .then(|| outcome.platform_confirmation.clone());

        let txn = self.db.begin().await?;
        let claimed = job::Entity::update_many()
            .col_expr(job::Column::Callbacked, Expr::value(true))
            .col_expr(job::Column::StartedAt, Expr::value(started_at.naive_utc()))
            .col_expr(job::Column::CompletedAt, Expr::value(completed_at.naive_utc()))
            .col_expr(job::Column::Logs, Expr::value(logs))
            .col_expr(job::Column::ReservedTime, Expr::value(reserved_time.clone()))
            .col_expr(job::Column::Confirmation, Expr::value(confirmation.clone()))
            .col_expr(job::Column::ErrorMessage, Expr::value(error_message.clone()))
            .col_expr(job::Column::UpdatedAt, Expr::value(now()))
            .filter(job::Column::Id.eq(row.id.as_str()))
            .filter(job::Column::Callbacked.eq(false))
            .exec(&txn)
            .await?;
        if claimed.rows_affected == 0 {
            txn.rollback().await?;
            tracing::info!(job_id = %row.id, "Concurrent duplicate callback rejected");
            return Err(ServiceError::Forbidden("job already reported".into()));
        }

        let advanced = job::Entity::update_many()
            .col_expr(job::Column::Status, Expr::value(status))
            .filter(
                Condition::all()
                    .add(job::Column::Id.eq(row.id.as_str()))
                    .add(job::Column::Status.is_in(JobStatus::reportable())),
            )
            .exec(&txn)
            .await?;

        // Side effects of a booking ride along in savepoints: a failure there
        // is logged and never undoes the recorded outcome.
        if outcome.success {
            let savepoint = txn.begin().await?;
            match record_reservation(&savepoint, row, reserved_time.as_deref(), confirmation).await {
                Ok(()) => savepoint.commit().await?,
                Err(e) => {
                    tracing::error!(job_id = %row.id, error = %e, "Could not record reservation");
                    savepoint.rollback().await?;
                }
            }
            if let Some(drop_config_id) = &row.drop_config_id {
                let savepoint = txn.begin().await?;
                match record_success(&savepoint, drop_config_id, &row.restaurant_id).await {
                    Ok(()) => savepoint.commit().await?,
                    Err(e) => {
                        tracing::error!(job_id = %row.id, error = %e, "Could not update drop config confidence");
                        savepoint.rollback().await?;
                    }
                }
            }
        }
        txn.commit().await?;

        if advanced.rows_affected == 0 {
            tracing::warn!(
                job_id = %row.id,
                reported = ?status,
                "Outcome reported for a job that was no longer pending; status kept"
            );
            if outcome.success {
                tracing::warn!(job_id = %row.id, "Cancelled job was booked on the platform; no compensation performed");
            }
        } else {
            tracing::info!(
                job_id = %row.id,
                status = ?status,
                drift_ns = outcome.drift_ns,
                duration_ns = outcome.duration,
                "Job outcome recorded"
            );
        }

        let updated = job::Entity::find_by_id(row.id.clone())
            .one(&self.db)
            .await?
            .ok_or_else(|| ServiceError::internal("reconciled job vanished"))?;
        Ok(updated.into())
    }
}

/// Reservation row for a successful job: the booked wall time on the
/// reservation date, in the restaurant's zone.
async fn record_reservation<C: ConnectionTrait>(
    db: &C,
    row: &job::Model,
    reserved_time: Option<&str>,
    confirmation: Option<serde_json::Value>,
) -> ServiceResult<()> {
    let reserved_time =
        reserved_time.ok_or_else(|| ServiceError::validation("outcome has no reservation time"))?;
    let wall: NaiveTime =
        parse_wall_time(reserved_time).map_err(|e| ServiceError::validation(e.to_string()))?;
    let restaurant = restaurant::Entity::find_by_id(row.restaurant_id.clone())
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::not_found("restaurant of job not found"))?;
    let tz = parse_timezone(&restaurant.timezone)?;
    let reservation_at = local_instant(row.reservation_date, wall, tz)?;

    let model = reservation::ActiveModel {
        id: Set(new_id()),
        user_id: Set(row.user_id.clone()),
        job_id: Set(row.id.clone()),
        restaurant_id: Set(row.restaurant_id.clone()),
        platform: Set(row.platform),
        confirmation: Set(confirmation.unwrap_or(serde_json::Value::Null)),
        reservation_at: Set(reservation_at.naive_utc()),
        party_size: Set(row.party_size),
        created_at: Set(now()),
    }
    .insert(db)
    .await?;
    tracing::info!(job_id = %row.id, reservation_id = %model.id, reservation_at = %reservation_at, "Reservation recorded");
    Ok(())
}

/// Parse each preferred time and render it as `HH:MM`, keeping order.
fn normalize_preferred_times(raw: &[String]) -> ServiceResult<Vec<String>> {
    if raw.is_empty() {
        return Err(ServiceError::validation("preferred_times must not be empty"));
    }
    raw.iter()
        .map(|value| {
            parse_wall_time(value)
                .map(format_wall_time)
                .map_err(|e| ServiceError::validation(e.to_string()))
        })
        .collect()
}

/// Decrypt a drop event's callback secret. Used by tests and operators.
pub async fn open_callback_secret(envelope: &Envelope, sealed: &Sealed) -> ServiceResult<String> {
    let bytes = envelope.decrypt(sealed).await?;
    String::from_utf8(bytes).map_err(|_| ServiceError::internal("callback secret is not utf-8"))
}
