use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::services::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportPolicy {
    Ignore,
    Report,
}

#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    public_code: String,
    public_message: Option<String>,
    report_policy: ReportPolicy,
    report_summary: Option<String>,
}

impl ApiError {
    pub const NOT_FOUND: ApiError = ApiError {
        status: StatusCode::NOT_FOUND,
        public_code: String::new(),
        public_message: None,
        report_policy: ReportPolicy::Ignore,
        report_summary: None,
    };

    pub const FORBIDDEN: ApiError = ApiError {
        status: StatusCode::FORBIDDEN,
        public_code: String::new(),
        public_message: None,
        report_policy: ReportPolicy::Ignore,
        report_summary: None,
    };

    pub const UNAUTHORIZED: ApiError = ApiError {
        status: StatusCode::UNAUTHORIZED,
        public_code: String::new(),
        public_message: None,
        report_policy: ReportPolicy::Ignore,
        report_summary: None,
    };
}

impl ApiError {
    fn new(
        status: StatusCode,
        public_code: impl Into<String>,
        public_message: Option<String>,
        report_policy: ReportPolicy,
    ) -> Self {
        Self {
            status,
            public_code: public_code.into(),
            public_message,
            report_policy,
            report_summary: None,
        }
    }

    fn with_report(mut self, summary: impl Into<String>) -> Self {
        self.report_summary = Some(summary.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!("Internal error: {}", msg);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            None,
            ReportPolicy::Report,
        )
        .with_report(msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Not found: {}", msg);
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", Some(msg), ReportPolicy::Ignore)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Bad request: {}", msg);
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", Some(msg), ReportPolicy::Ignore)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Unauthorized: {}", msg);
        Self::new(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            Some(msg),
            ReportPolicy::Ignore,
        )
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Forbidden: {}", msg);
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", Some(msg), ReportPolicy::Ignore)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Conflict: {}", msg);
        Self::new(StatusCode::CONFLICT, "CONFLICT", Some(msg), ReportPolicy::Ignore)
    }

    pub fn too_many_requests(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Too many requests: {}", msg);
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "TOO_MANY_REQUESTS",
            Some(msg),
            ReportPolicy::Ignore,
        )
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!("Service unavailable: {}", msg);
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            Some("Service unavailable".to_string()),
            ReportPolicy::Report,
        )
        .with_report(msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorEnvelope<'a> {
            error: ErrorBody<'a>,
        }

        #[derive(Serialize)]
        struct ErrorBody<'a> {
            code: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            id: Option<&'a str>,
            message: &'a str,
        }

        let code = if self.public_code.is_empty() {
            match self.status {
                StatusCode::NOT_FOUND => "NOT_FOUND",
                StatusCode::FORBIDDEN => "FORBIDDEN",
                StatusCode::UNAUTHORIZED => "UNAUTHORIZED",
                StatusCode::BAD_REQUEST => "BAD_REQUEST",
                _ => "ERROR",
            }
        } else {
            self.public_code.as_str()
        };

        let public_message = self
            .public_message
            .as_deref()
            .unwrap_or_else(|| self.status.canonical_reason().unwrap_or("Error"));

        let error_id = (self.report_policy == ReportPolicy::Report)
            .then(|| uuid::Uuid::new_v4().simple().to_string());

        let mut response = (
            self.status,
            Json(ErrorEnvelope {
                error: ErrorBody {
                    code,
                    id: error_id.as_deref(),
                    message: public_message,
                },
            }),
        )
            .into_response();

        if let Some(id) = error_id.as_deref() {
            if let Ok(v) = HeaderValue::from_str(id) {
                response.headers_mut().insert("x-error-id", v);
            }
            tracing::error!(
                error_id = %id,
                status = self.status.as_u16(),
                summary = self.report_summary.as_deref().unwrap_or(public_message),
                "Reported error"
            );
        }

        response
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => Self::bad_request(msg),
            ServiceError::NotFound(msg) => Self::not_found(msg),
            ServiceError::Unauthorized(msg) => Self::unauthorized(msg),
            ServiceError::Forbidden(msg) => Self::forbidden(msg),
            ServiceError::Conflict(msg) => Self::conflict(msg),
            ServiceError::Dependency(msg) => Self::service_unavailable(msg),
            ServiceError::Internal(msg) => Self::internal(msg),
        }
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(err: sea_orm::DbErr) -> Self {
        tracing::error!("Database error: {:?}", err);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "DATABASE_ERROR",
            None,
            ReportPolicy::Report,
        )
        .with_report(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        // Parsing errors are caller-made; keep the message, do not report.
        Self::bad_request(format!("JSON error: {}", err))
    }
}

impl std::error::Error for ApiError {}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.public_code.as_str())
    }
}

#[macro_export]
macro_rules! internal {
    ($($arg:tt)*) => { $crate::error::ApiError::internal(format!($($arg)*)) };
}

#[macro_export]
macro_rules! not_found {
    ($($arg:tt)*) => { $crate::error::ApiError::not_found(format!($($arg)*)) };
}

#[macro_export]
macro_rules! bad_request {
    ($($arg:tt)*) => { $crate::error::ApiError::bad_request(format!($($arg)*)) };
}

#[macro_export]
macro_rules! unauthorized {
    ($($arg:tt)*) => { $crate::error::ApiError::unauthorized(format!($($arg)*)) };
}

#[macro_export]
macro_rules! forbidden {
    ($($arg:tt)*) => { $crate::error::ApiError::forbidden(format!($($arg)*)) };
}
