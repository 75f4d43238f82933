use axum::extract::{Path, Query, State};
use axum::{
    Extension, Json, Router,
    routing::{get, post},
};
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::jwt::AuthUser;
use crate::services::jobs::{CreateJob, JobView};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_job))
        .route("/list", get(list_jobs))
        .route("/{id}", get(get_job))
        .route("/{id}/cancel", post(cancel_job))
}

#[tracing::instrument(name = "POST /api/job", skip(state, user, input), fields(user_id = %user.user_id))]
pub async fn create_job(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(input): Json<CreateJob>,
) -> Result<Json<JobView>, ApiError> {
    if !state.job_rate_limiter.check(&user.user_id) {
        return Err(ApiError::too_many_requests("job creation rate limit exceeded"));
    }
    let job = state.jobs.create(&user.user_id, input).await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub upcoming: bool,
}

#[tracing::instrument(name = "GET /api/job/list", skip(state, user), fields(user_id = %user.user_id))]
pub async fn list_jobs(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<JobView>>, ApiError> {
    Ok(Json(state.jobs.list(&user.user_id, query.upcoming).await?))
}

#[tracing::instrument(name = "GET /api/job/{id}", skip(state, user))]
pub async fn get_job(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    Ok(Json(state.jobs.get(&user.user_id, &id).await?))
}

#[tracing::instrument(name = "POST /api/job/{id}/cancel", skip(state, user))]
pub async fn cancel_job(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    Ok(Json(state.jobs.cancel(&user.user_id, &id).await?))
}
