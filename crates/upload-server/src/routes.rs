//! Route configuration.

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::PUBLIC_ROUTE;
use crate::handlers;
use crate::state::AppState;

/// Room for multipart boundaries and the `chunk_index` field on top of the
/// chunk payload itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create the application router. Finalized files are served read-only
/// under `/storage`.
pub fn create_router(state: AppState) -> Router {
    let chunk_body_limit =
        state.uploads.config().limits.max_chunk_bytes as usize + MULTIPART_OVERHEAD;

    let router = match state.uploads.public_root() {
        Ok(dir) => Router::new().nest_service(PUBLIC_ROUTE, ServeDir::new(dir)),
        Err(e) => {
            warn!("not serving finalized files: {e}");
            Router::new()
        }
    };

    router
        .route("/health", get(handlers::health_check))
        .route("/uploads/init", post(handlers::init_upload))
        .route(
            "/uploads/{upload_id}/chunk",
            post(handlers::upload_chunk).layer(DefaultBodyLimit::max(chunk_body_limit)),
        )
        .route("/uploads/{upload_id}/status", get(handlers::upload_status))
        .route(
            "/uploads/{upload_id}/complete",
            post(handlers::complete_upload),
        )
        .route("/uploads/{upload_id}", delete(handlers::cancel_upload))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
