pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod surface;

use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

/// Build the full application router over shared state.
pub fn app(state: Arc<AppState>) -> anyhow::Result<Router> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(
            state
                .config
                .cors_allowed_origins
                .split(',')
                .map(|origin| origin.trim().parse::<HeaderValue>())
                .collect::<Result<Vec<_>, _>>()?,
        );

    Ok(Router::new()
        .merge(routes::pages::router())
        .nest("/api/auth", routes::auth::router())
        .nest("/api", routes::sync::router())
        .route("/health", get(health_check))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

async fn health_check() -> &'static str {
    "Smart Bookmarks is running!"
}
