//! Error types for the ingestion pipeline.

use flowgate_core::{DateRange, RejectionBreakdown};
use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during ingestion.
///
/// Messages never include row content, identifiers, narrations, or file
/// names. Column names are schema, not data, and may appear.
#[derive(Error, Debug)]
pub enum Error {
    /// A required column is absent from the batch schema.
    #[error("missing required columns: {0:?}")]
    MissingRequiredColumn(Vec<&'static str>),

    /// The batch was rejected by a pipeline guardrail before persistence.
    #[error(transparent)]
    Rejected(#[from] BatchRejection),

    /// The storage port refused the batch as a duplicate idempotency key.
    #[error("batch already ingested")]
    AlreadyIngested,

    /// Structurally invalid request (bad dates, empty file, oversized batch).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Storage backend failure. Opaque to callers.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Reason a whole batch was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchRejectReason {
    EmptyBatch,
    NoValidRows,
    LowAcceptRatio,
    DeclaredRangeViolation,
}

impl BatchRejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmptyBatch => "EMPTY_BATCH",
            Self::NoValidRows => "NO_VALID_ROWS",
            Self::LowAcceptRatio => "LOW_ACCEPT_RATIO",
            Self::DeclaredRangeViolation => "DECLARED_RANGE_VIOLATION",
        }
    }
}

/// Batch-level rejection with the counts accumulated up to the point of
/// failure. Short-circuits the pipeline; nothing is persisted.
#[derive(Error, Debug, Clone)]
#[error("batch rejected: {}", self.reason.as_str())]
pub struct BatchRejection {
    pub reason: BatchRejectReason,
    pub rows_accepted: u64,
    pub rows_rejected: u64,
    pub rejection_breakdown: RejectionBreakdown,
    /// Set for `LOW_ACCEPT_RATIO`.
    pub accepted_ratio: Option<f64>,
    pub min_accept_ratio: Option<f64>,
    /// Set for `DECLARED_RANGE_VIOLATION`.
    pub declared_range: Option<DateRange>,
    pub inferred_range: Option<DateRange>,
}

impl BatchRejection {
    pub fn new(reason: BatchRejectReason) -> Self {
        Self {
            reason,
            rows_accepted: 0,
            rows_rejected: 0,
            rejection_breakdown: RejectionBreakdown::new(),
            accepted_ratio: None,
            min_accept_ratio: None,
            declared_range: None,
            inferred_range: None,
        }
    }

    pub fn with_counts(
        mut self,
        rows_accepted: u64,
        rows_rejected: u64,
        breakdown: RejectionBreakdown,
    ) -> Self {
        self.rows_accepted = rows_accepted;
        self.rows_rejected = rows_rejected;
        self.rejection_breakdown = breakdown;
        self
    }
}
