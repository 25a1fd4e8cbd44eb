//! Axum router construction for the dispatch API.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router for the dispatch server.
///
/// The router includes:
/// - `POST /api/drivers` -- ingest a position ping
/// - `GET /api/drivers/nearest` -- k-nearest query
/// - `GET /api/drivers/{id}` -- point lookup
/// - `DELETE /api/drivers/{id}` -- remove a driver
/// - `GET /api/drivers/{id}/history` -- recent positions
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/drivers", post(handlers::ingest))
        .route("/api/drivers/nearest", get(handlers::nearest))
        .route(
            "/api/drivers/{id}",
            get(handlers::get_agent).delete(handlers::delete_agent),
        )
        .route("/api/drivers/{id}/history", get(handlers::agent_history))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
