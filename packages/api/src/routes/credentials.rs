use axum::extract::{Path, State};
use axum::{
    Extension, Json, Router,
    routing::{get, post, put},
};
use cierge_types::Platform;
use serde::Serialize;

use crate::error::ApiError;
use crate::middleware::jwt::AuthUser;
use crate::services::credentials::{PlatformTokenView, PutCredentials};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_credentials))
        .route("/{platform}", put(put_credentials))
        .route("/{platform}/rotate", post(rotate_credentials))
}

fn parse_platform(raw: &str) -> Result<Platform, ApiError> {
    raw.parse::<Platform>()
        .map_err(|e| crate::bad_request!("{}", e))
}

#[tracing::instrument(name = "PUT /api/credentials/{platform}", skip(state, user, input))]
pub async fn put_credentials(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(platform): Path<String>,
    Json(input): Json<PutCredentials>,
) -> Result<Json<PlatformTokenView>, ApiError> {
    let platform = parse_platform(&platform)?;
    Ok(Json(
        state
            .credentials
            .put(&user.user_id, platform, &input)
            .await?,
    ))
}

#[tracing::instrument(name = "GET /api/credentials", skip(state, user))]
pub async fn list_credentials(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<PlatformTokenView>>, ApiError> {
    Ok(Json(state.credentials.list(&user.user_id).await?))
}

#[derive(Serialize)]
pub struct RotateResponse {
    pub updated_jobs: usize,
}

#[tracing::instrument(name = "POST /api/credentials/{platform}/rotate", skip(state, user))]
pub async fn rotate_credentials(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(platform): Path<String>,
) -> Result<Json<RotateResponse>, ApiError> {
    let platform = parse_platform(&platform)?;
    let updated_jobs = state.credentials.rotate(&user.user_id, platform).await?;
    Ok(Json(RotateResponse { updated_jobs }))
}
