//! abx-server library - A/B test allocation and significance service
//!
//! Exposes the experiment store, the traffic allocator, the event
//! recorder and the results scorer behind a JSON-over-HTTP API.

use axum::Router;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub mod allocator;
pub mod api;
pub mod recorder;
pub mod scorer;
pub mod store;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    Router::new()
        .route("/tests", post(api::create_test).get(api::list_tests))
        .route("/tests/:id", get(api::get_test).delete(api::delete_test))
        .route("/tests/:id/start", post(api::start_test))
        .route("/tests/:id/pause", post(api::pause_test))
        .route("/tests/:id/complete", post(api::complete_test))
        .route("/tests/:id/event", post(api::record_event))
        .route("/tests/:id/variant", get(api::get_variant))
        .route("/tests/:id/results", get(api::get_results))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
