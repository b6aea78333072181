//! API route definitions.

mod health;
mod ingest;

use axum::Router;
use axum::routing::{get, post};

use crate::state::AppState;

/// Build the complete API router.
///
/// # Route Structure
///
/// - `GET /health` - health check
/// - `POST /v1/ingest/files` - tabular (multipart) ingestion
/// - `POST /v1/ingest/feeds` - event-feed (JSON) ingestion
pub fn router(state: AppState) -> Router {
    let ingest = Router::new()
        .route("/files", post(ingest::ingest_file))
        .route("/feeds", post(ingest::ingest_feed));

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/v1/ingest", ingest)
        .with_state(state)
}
