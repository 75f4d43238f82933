//! Authentication of worker outcome reports.
//!
//! The worker presents its per-job callback secret as a bearer token. The
//! body is buffered to find `job_id` and then handed on unchanged.

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::jwt::bearer;
use crate::entity::job;
use crate::error::ApiError;
use crate::state::AppState;

/// Outcome documents are small; anything larger is refused.
pub const MAX_CALLBACK_BODY: usize = 256 * 1024;

/// Job whose callback secret was verified for this request.
#[derive(Debug, Clone)]
pub struct CallbackJob(pub Arc<job::Model>);

pub async fn callback_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(secret) = bearer(&request).map(str::to_owned) else {
        return Err(crate::unauthorized!("missing callback credentials"));
    };

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_CALLBACK_BODY)
        .await
        .map_err(|_| ApiError::bad_request("unreadable request body"))?;

    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|_| ApiError::bad_request("malformed JSON body"))?;
    let Some(job_id) = value.get("job_id").and_then(|v| v.as_str()) else {
        return Err(ApiError::unauthorized("invalid callback credentials"));
    };

    let row = state.jobs.authenticate_callback(job_id, &secret).await?;

    let mut request = Request::from_parts(parts, Body::from(bytes));
    request.extensions_mut().insert(CallbackJob(Arc::new(row)));
    Ok(next.run(request).await)
}
