use axum::extract::{Query, State};
use axum::{Json, Router, routing::get};
use serde::Deserialize;

use crate::error::ApiError;
use crate::services::drop_configs::{CreateDropConfig, DropConfigView};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(list_drop_configs).post(create_drop_config))
}

#[tracing::instrument(name = "POST /api/drop-config", skip(state))]
pub async fn create_drop_config(
    State(state): State<AppState>,
    Json(input): Json<CreateDropConfig>,
) -> Result<Json<DropConfigView>, ApiError> {
    Ok(Json(state.drop_configs.create(input).await?))
}

#[derive(Debug, Deserialize)]
pub struct DropConfigQuery {
    pub restaurant_id: String,
}

#[tracing::instrument(name = "GET /api/drop-config", skip(state))]
pub async fn list_drop_configs(
    State(state): State<AppState>,
    Query(query): Query<DropConfigQuery>,
) -> Result<Json<Vec<DropConfigView>>, ApiError> {
    Ok(Json(
        state
            .drop_configs
            .list_for_restaurant(&query.restaurant_id)
            .await?,
    ))
}
