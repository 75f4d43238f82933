use axum::body::Bytes;
use axum::extract::State;
use axum::{Extension, Json, Router, routing::post};
use cierge_types::Outcome;
use serde::Serialize;

use crate::error::ApiError;
use crate::middleware::callback::CallbackJob;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/job/status", post(job_status))
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub message: String,
}

/// Worker outcome report. Authentication already happened in the callback
/// middleware, which pins the job.
#[tracing::instrument(name = "POST /internal/job/status", skip(state, job, body), fields(job_id = %job.0.id))]
pub async fn job_status(
    State(state): State<AppState>,
    Extension(job): Extension<CallbackJob>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    let outcome: Outcome = serde_json::from_slice(&body)?;
    let view = state.jobs.reconcile(&job.0, &outcome).await?;
    Ok(Json(StatusResponse {
        message: format!("job {} recorded as {:?}", view.id, view.status).to_lowercase(),
    }))
}
