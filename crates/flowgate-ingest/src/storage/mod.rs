//! Storage port for derived outputs.
//!
//! The port is the only path to persistence, and it only accepts the two
//! derived value types ([`BatchMetadata`], [`DailyAggregate`]). Raw rows,
//! tokens, narrations, and file names are unrepresentable at this boundary;
//! the type system is the field whitelist.
//!
//! Both operations must be atomic with respect to one batch, and the port is
//! the serialization point for duplicate detection: of two concurrent batches
//! with the same idempotency key, exactly one commits.

pub mod memory;

use flowgate_core::{BatchId, BatchMetadata, DailyAggregate};
use thiserror::Error;

pub use memory::MemorySink;

/// Storage-side failures.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A batch with this idempotency key was already committed.
    #[error("duplicate batch")]
    DuplicateBatch,

    /// Backend failure. Message must not contain payload content.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Persistence contract for derived ingestion outputs.
///
/// Implementations own their connection/lock discipline; callers treat the
/// port as thread-safe.
pub trait StoragePort: Send + Sync {
    /// Commit batch metadata, enforcing idempotency-key uniqueness.
    ///
    /// Returns the assigned batch id, or [`StorageError::DuplicateBatch`]
    /// when the key was seen before.
    fn commit_batch(&self, metadata: &BatchMetadata) -> Result<BatchId, StorageError>;

    /// Upsert daily aggregates by `(subject_ref, date)`.
    ///
    /// The conflict policy for repeated days is additive merge: sums and
    /// counts add, and distinct-payer cardinality adds as an upper bound
    /// unless the backend keeps a sketch (each backend documents its choice).
    fn commit_daily_aggregates(
        &self,
        batch_id: BatchId,
        aggregates: &[DailyAggregate],
    ) -> Result<(), StorageError>;
}
