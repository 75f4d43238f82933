use axum::extract::State;
use axum::{Extension, Json, Router, routing::post};
use serde::Serialize;

use crate::auth::LOGOUT;
use crate::error::ApiError;
use crate::middleware::jwt::AuthUser;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/logout", post(logout))
}

#[derive(Serialize)]
pub struct LogoutResponse {
    pub revoked: bool,
}

#[tracing::instrument(name = "POST /api/auth/logout", skip(state, user), fields(user_id = %user.user_id))]
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<LogoutResponse>, ApiError> {
    let revoked = state.access.revoke(&user.jti, LOGOUT).await?;
    Ok(Json(LogoutResponse { revoked }))
}
