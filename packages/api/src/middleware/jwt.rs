use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Authenticated caller, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub jti: String,
}

/// Token after an optional `Bearer ` prefix, trimmed.
pub(crate) fn bearer(request: &Request) -> Option<&str> {
    let value = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then_some(token)
}

pub async fn jwt_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = bearer(&request).map(str::to_owned) else {
        return Err(ApiError::UNAUTHORIZED);
    };

    let claims = state.access.validate(&token).await?;
    request.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
        jti: claims.jti,
    });
    Ok(next.run(request).await)
}
