use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/rag/invoke", post(handlers::invoke))
        .route("/rag/stream", post(handlers::stream))
        .route("/upload", post(handlers::upload))
        .route("/load-and-process-pdfs", post(handlers::load_and_process))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
