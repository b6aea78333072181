//! Flowgate ingestion pipeline components.
//!
//! This crate implements the regulatory-safe ingestion boundary for merchant
//! cash-flow data: raw batches in, derived aggregates out, nothing row-shaped
//! ever persisted.
//!
//! # Modules
//!
//! - [`adapter`] - tabular and event-feed adapters producing typed row-maps
//! - [`validate`] - row validation and the status/quality gate
//! - [`normalize`] - projection into canonical records
//! - [`classify`] - semantic (role/purpose) and CCT classification
//! - [`keying`] - deterministic idempotency keys
//! - [`aggregate`] - per-day control-bucket aggregation
//! - [`pipeline`] - the batch orchestrator
//! - [`storage`] - the storage port and the in-memory sink
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   Adapters   │  (tabular bytes, event feeds)
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │  Validation  │  required fields, status gate; rejections counted
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │ Classifiers  │  role/purpose → CCT with thresholds + ambiguity
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │  Aggregator  │  per-day bucket counts/sums + derived ratios
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │ Storage port │  BatchMetadata + DailyAggregate only; duplicates refused
//! └──────────────┘
//! ```
//!
//! The pipeline is derived-first: raw rows are scoped to one request and are
//! dropped on every exit path; only aggregates cross the storage port.

pub mod adapter;
pub mod aggregate;
pub mod classify;
pub mod config;
pub mod error;
pub mod keying;
pub mod normalize;
pub mod pipeline;
pub mod storage;
pub mod validate;

// Re-export commonly used types at crate root
pub use config::PolicyConfig;
pub use error::{BatchRejectReason, BatchRejection, Error, Result};
pub use pipeline::{FeedRequest, IngestReceipt, Pipeline, TabularRequest};
pub use storage::{MemorySink, StorageError, StoragePort};
