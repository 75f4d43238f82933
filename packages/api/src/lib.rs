//! Cierge API
//!
//! HTTP surface and domain services of the drop booking server: jobs,
//! platform credentials, restaurants and drop configs, access tokens and the
//! worker callback.

use axum::{Router, middleware::from_fn_with_state};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, decompression::RequestDecompressionLayer, trace::TraceLayer};

use crate::middleware::{callback::callback_middleware, jwt::jwt_middleware};
use crate::state::AppState;

pub mod auth;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod schema;
pub mod secret;
pub mod services;
pub mod state;
pub mod time;
pub mod token_store;

#[cfg(test)]
pub(crate) mod test_support;

pub use axum;
pub use sea_orm;

pub fn construct_router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/job", routes::job::routes())
        .nest("/credentials", routes::credentials::routes())
        .nest("/restaurant", routes::restaurant::routes())
        .nest("/drop-config", routes::drop_config::routes())
        .nest("/reservation", routes::reservation::routes())
        .nest("/auth", routes::auth::routes())
        .layer(from_fn_with_state(state.clone(), jwt_middleware));

    let internal = routes::internal::routes()
        .layer(from_fn_with_state(state.clone(), callback_middleware));

    Router::new()
        .nest("/api", api)
        .nest("/internal", internal)
        .nest("/health", routes::health::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(ServiceBuilder::new().layer(RequestDecompressionLayer::new()))
}
