//! Route definitions and router construction.

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::bootstrap::{AxumContext, CorsConfig};
use crate::handlers;
use crate::state::AppState;

/// Build CORS layer from configuration.
fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    match config {
        CorsConfig::AllowAll => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        CorsConfig::AllowOrigins(origins) => {
            let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}

/// API routes without the `/api` prefix.
///
/// Static segments (`history`, `active-count`) are matched before `{id}`.
pub(crate) fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/downloads",
            get(handlers::downloads::list).post(handlers::downloads::create),
        )
        .route("/downloads/history", delete(handlers::downloads::clear_history))
        .route("/downloads/active-count", get(handlers::downloads::active_count))
        .route(
            "/downloads/{id}",
            get(handlers::downloads::get).delete(handlers::downloads::delete),
        )
        .route("/downloads/{id}/cancel", post(handlers::downloads::cancel))
}

/// Create the main Axum router with all API routes.
///
/// # Path Parameter Syntax
/// Axum 0.8 uses brace syntax for path parameters: `{id}`
pub fn create_router(ctx: AxumContext, cors_config: &CorsConfig) -> Router {
    let state: AppState = Arc::new(ctx);
    let cors = build_cors_layer(cors_config);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes().with_state(state).layer(cors))
        .layer(TraceLayer::new_for_http())
}

/// Health check endpoint.
pub(crate) async fn health_check() -> &'static str {
    "OK"
}
