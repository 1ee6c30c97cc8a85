use std::path::Path;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::services::{ServeDir, ServeFile};
use tracing::info;

use crate::compiler::handlers as compile_handlers;
use crate::optimizer::handlers as optimize_handlers;
use crate::state::AppState;

/// API routes, plus the frontend's static export when `static_dir` exists.
/// Unknown paths fall back to `index.html` for client-side routing.
pub fn build_router(state: AppState, static_dir: &Path) -> Router {
    let router = Router::new()
        .route("/api/health", get(compile_handlers::handle_health))
        .route("/api/optimize", post(optimize_handlers::handle_optimize))
        .route("/api/compile", post(compile_handlers::handle_compile))
        .with_state(state);

    if !static_dir.is_dir() {
        return router;
    }

    info!("Mounting frontend static files from {}", static_dir.display());
    let frontend = ServeDir::new(static_dir)
        .append_index_html_on_directories(true)
        .fallback(ServeFile::new(static_dir.join("index.html")));
    router.fallback_service(frontend)
}
