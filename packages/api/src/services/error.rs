use cierge_envelope::EnvelopeError;
use cierge_scheduler::SchedulerError;

use crate::token_store::TokenStoreError;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failure categories shared by every service. Handlers map each category to
/// one HTTP status; adapters map their own errors into a category.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("dependency failed: {0}")]
    Dependency(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<sea_orm::DbErr> for ServiceError {
    fn from(err: sea_orm::DbErr) -> Self {
        tracing::error!(error = ?err, "Database error");
        Self::Internal(err.to_string())
    }
}

impl From<sea_orm::TransactionError<ServiceError>> for ServiceError {
    fn from(err: sea_orm::TransactionError<ServiceError>) -> Self {
        match err {
            sea_orm::TransactionError::Connection(db_err) => db_err.into(),
            sea_orm::TransactionError::Transaction(service_err) => service_err,
        }
    }
}

impl From<EnvelopeError> for ServiceError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Transient(msg) => Self::Dependency(format!("key service: {}", msg)),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<SchedulerError> for ServiceError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::NotFound(msg) => Self::NotFound(msg),
            SchedulerError::AlreadyExists(msg) => Self::Conflict(msg),
            SchedulerError::InvalidEvent(msg) => Self::Validation(msg),
            SchedulerError::ProviderError(msg) => Self::Dependency(format!("scheduler: {}", msg)),
            SchedulerError::ConfigError(msg) | SchedulerError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<TokenStoreError> for ServiceError {
    fn from(err: TokenStoreError) -> Self {
        match err {
            TokenStoreError::NotFound(jti) => Self::NotFound(format!("token {} not found", jti)),
            other => Self::Internal(other.to_string()),
        }
    }
}
