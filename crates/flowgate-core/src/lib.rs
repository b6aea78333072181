//! Core types and shared utilities for the Flowgate ingestion boundary.
//!
//! This crate provides:
//! - The canonical in-memory transaction model and its enumerations
//! - Cash Control Type (CCT) and rejection-reason taxonomies
//! - The two persisted record types ([`BatchMetadata`], [`DailyAggregate`])
//! - Prometheus metrics helpers
//!
//! Everything row-shaped in here is ephemeral: [`CanonicalRecord`] deliberately
//! does not implement `Serialize`, so it can never cross the storage port or
//! land in a response body. Only the derived types do.

pub mod metrics;
mod model;

pub use model::{
    BatchId, BatchMetadata, BucketKey, BucketTotals, CanonicalRecord, Cct, CctResult, Channel,
    DailyAggregate, DateRange, Direction, Flow, PurposeClass, RejectReason, RejectionBreakdown,
    RoleClass, SemanticResult,
};

/// Guard constant for ratio denominators.
pub const EPSILON: f64 = 1e-9;

/// Round to 2 decimal places (money sums).
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Round to 6 decimal places (persisted ratios).
pub fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.005 + 2.005), 3.01);
        assert_eq!(round2(0.1 + 0.2), 0.3);
    }

    #[test]
    fn test_round6() {
        assert_eq!(round6(1.0 / 3.0), 0.333333);
    }
}
