use axum::extract::State;
use axum::{Extension, Json, Router, routing::get};

use crate::error::ApiError;
use crate::middleware::jwt::AuthUser;
use crate::services::jobs::ReservationView;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/list", get(list_reservations))
}

#[tracing::instrument(name = "GET /api/reservation/list", skip(state, user))]
pub async fn list_reservations(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<ReservationView>>, ApiError> {
    Ok(Json(state.jobs.list_reservations(&user.user_id).await?))
}
