use axum::extract::{Path, State};
use axum::{
    Json, Router,
    routing::{get, post},
};

use crate::entity::restaurant;
use crate::error::ApiError;
use crate::services::restaurants::UpsertRestaurant;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(upsert_restaurant))
        .route("/{id}", get(get_restaurant))
}

#[tracing::instrument(name = "POST /api/restaurant", skip(state))]
pub async fn upsert_restaurant(
    State(state): State<AppState>,
    Json(input): Json<UpsertRestaurant>,
) -> Result<Json<restaurant::Model>, ApiError> {
    Ok(Json(state.restaurants.upsert(input).await?))
}

#[tracing::instrument(name = "GET /api/restaurant/{id}", skip(state))]
pub async fn get_restaurant(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<restaurant::Model>, ApiError> {
    Ok(Json(state.restaurants.get(&id).await?))
}
