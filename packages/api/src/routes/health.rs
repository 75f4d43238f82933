use axum::extract::State;
use axum::{Json, Router, routing::get};
use sea_orm::ConnectionTrait;
use serde::Serialize;
use std::time::Instant;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(health))
        .route("/db", get(db_health))
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct DbHealthResponse {
    pub rtt: u128,
}

#[tracing::instrument(name = "GET /health")]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[tracing::instrument(name = "GET /health/db", skip(state))]
pub async fn db_health(State(state): State<AppState>) -> Result<Json<DbHealthResponse>, ApiError> {
    let started = Instant::now();
    state
        .db
        .execute_unprepared("SELECT 1")
        .await
        .map_err(|e| ApiError::service_unavailable(format!("database ping failed: {}", e)))?;
    Ok(Json(DbHealthResponse {
        rtt: started.elapsed().as_millis(),
    }))
}
