//! Scheduler trait definitions

use chrono::{DateTime, Utc};
use cierge_types::{DropEvent, Sealed};
use uuid::Uuid;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Error type for scheduler operations
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Schedule not found: {0}")]
    NotFound(String),

    #[error("Schedule already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid drop event: {0}")]
    InvalidEvent(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A pending one-shot firing
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleInfo {
    pub job_id: Uuid,
    /// When the worker is started (drop time minus the cold start buffer)
    pub fire_at: DateTime<Utc>,
    /// Payload the worker receives
    pub event: DropEvent,
}

/// Trait for scheduler backend implementations
///
/// Each entry fires exactly once and is removed afterwards. Entries are keyed
/// by job id, so submitting the same job twice cannot create two firings.
#[async_trait::async_trait]
pub trait SchedulerBackend: Send + Sync {
    /// Fire `event` into a worker at `fire_at`.
    async fn schedule(&self, event: &DropEvent, fire_at: DateTime<Utc>) -> SchedulerResult<()>;

    /// Remove a pending firing. Missing entries count as success.
    async fn cancel(&self, job_id: Uuid) -> SchedulerResult<()>;

    /// Swap the encrypted credential bundle of a pending firing, keeping its
    /// fire time and drop time.
    async fn update_credentials(&self, job_id: Uuid, encrypted_token: Sealed) -> SchedulerResult<()>;

    /// Look up a pending firing.
    async fn get(&self, job_id: Uuid) -> SchedulerResult<Option<ScheduleInfo>>;
}

/// Deterministic entry name for a job.
pub fn schedule_name(job_id: Uuid) -> String {
    format!("cierge-job-{}", job_id)
}

pub(crate) fn validate(event: &DropEvent, fire_at: DateTime<Utc>) -> SchedulerResult<()> {
    if fire_at > event.drop_time {
        return Err(SchedulerError::InvalidEvent(
            "fire time is after the drop time".to_string(),
        ));
    }
    if event.preferred_times.is_empty() {
        return Err(SchedulerError::InvalidEvent(
            "no preferred times".to_string(),
        ));
    }
    if event.encrypted_token.is_empty() || event.encrypted_callback_secret.is_empty() {
        return Err(SchedulerError::InvalidEvent(
            "missing encrypted credentials".to_string(),
        ));
    }
    Ok(())
}
