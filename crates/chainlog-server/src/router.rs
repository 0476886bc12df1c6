use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all chainlog endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/write",
            get(handler::write_handler).post(handler::write_handler),
        )
        .route(
            "/create",
            get(handler::create_handler).post(handler::create_handler),
        )
        .route("/_ah/health", get(handler::health_handler))
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler))
        .route("/v1/tail", get(handler::tail_handler))
        .route("/v1/records", get(handler::records_handler))
        .route("/v1/records/:sequence", get(handler::record_handler))
        .route("/v1/verify", get(handler::verify_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
