//! UI layer: axum router, handlers and shared state.

pub mod handler;
mod runner;
mod signal;
pub mod state;

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

pub use runner::{build_state, run, serve};
pub use signal::shutdown_signal;

use self::state::AppState;

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(handler::websocket_handler))
        .route("/relay", get(handler::relay_handler))
        .route("/api/health", get(handler::health_check))
        .route("/api/rooms", get(handler::list_rooms))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
