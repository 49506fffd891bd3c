//! HTTP routes for the job endpoint

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

mod jobs;

use crate::state::AppState;

/// Build the router. `/run` streams NDJSON envelopes; `/runsync` returns them
/// aggregated once the job ends.
pub fn create_router(state: AppState, cors_enabled: bool) -> Router {
    let router = Router::new()
        .route("/health", get(jobs::health))
        .route("/run", post(jobs::run))
        .route("/runsync", post(jobs::runsync))
        .layer(TraceLayer::new_for_http());

    let router = if cors_enabled {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };

    router.with_state(state)
}
