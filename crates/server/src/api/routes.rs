use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, pipelines, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Pipelines
        .route(
            "/pipelines",
            post(pipelines::create_pipeline).get(pipelines::list_pipelines),
        )
        .route(
            "/pipelines/{id}",
            get(pipelines::get_pipeline).delete(pipelines::stop_pipeline),
        )
        // Live updates
        .route("/ws", get(ws::ws_handler));

    Router::new()
        .route("/", get(handlers::root_status))
        .route("/metrics", get(handlers::metrics))
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(super::middleware::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
