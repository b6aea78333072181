//! Flowgate Serve - HTTP ingestion surface.
//!
//! This crate exposes the two ingestion operations over HTTP and maps
//! pipeline outcomes onto response codes:
//!
//! - batch rejections → 400 with a reason code and counts
//! - duplicate idempotency keys → 409 `ALREADY_INGESTED`
//! - internal failures → opaque 500
//!
//! Responses carry only derived values: hashes, counts, ranges, and rates.
//! Raw rows, tokens, narrations, and file names never appear in a response
//! or a log line.
//!
//! # Architecture
//!
//! - **AppState**: shared pipeline handle and configuration
//! - **Routes**: `/health` plus the `/v1/ingest` operations
//! - **ApiError**: pipeline error → HTTP response mapping

mod error;
mod routes;
mod state;

pub use self::error::ApiError;
pub use self::routes::router;
pub use self::state::{AppState, Config};
