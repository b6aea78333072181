//! In-memory storage sink.
//!
//! Development and test only; state dies with the process. Duplicate
//! detection and batch-id assignment happen under one lock, so the
//! check-and-insert is atomic with respect to concurrent batches.
//!
//! Conflict policy for repeated days: additive merge. No distinct-count
//! sketch is kept, so `unique_payers_count` accumulates as an upper bound.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use flowgate_core::{BatchId, BatchMetadata, DailyAggregate};
use parking_lot::Mutex;

use super::{StorageError, StoragePort};

#[derive(Default)]
struct Inner {
    /// idempotency_key -> (batch_id, metadata)
    batches: BTreeMap<String, (BatchId, BatchMetadata)>,
    /// (subject_ref, date) -> merged aggregate
    daily: BTreeMap<(String, NaiveDate), DailyAggregate>,
    next_batch_id: BatchId,
}

/// Lock-protected in-memory implementation of [`StoragePort`].
#[derive(Default)]
pub struct MemorySink {
    inner: Mutex<Inner>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed batches.
    pub fn batch_count(&self) -> usize {
        self.inner.lock().batches.len()
    }

    /// Metadata of a committed batch by idempotency key.
    pub fn batch(&self, idempotency_key: &str) -> Option<BatchMetadata> {
        self.inner
            .lock()
            .batches
            .get(idempotency_key)
            .map(|(_, m)| m.clone())
    }

    /// All committed batch metadata, in key order.
    pub fn batches(&self) -> Vec<BatchMetadata> {
        self.inner
            .lock()
            .batches
            .values()
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Stored aggregate for one subject-day.
    pub fn daily(&self, subject_ref: &str, date: NaiveDate) -> Option<DailyAggregate> {
        self.inner
            .lock()
            .daily
            .get(&(subject_ref.to_string(), date))
            .cloned()
    }

    /// All stored aggregates for a subject, date-ordered.
    pub fn daily_for_subject(&self, subject_ref: &str) -> Vec<DailyAggregate> {
        self.inner
            .lock()
            .daily
            .iter()
            .filter(|((subject, _), _)| subject == subject_ref)
            .map(|(_, agg)| agg.clone())
            .collect()
    }
}

impl StoragePort for MemorySink {
    fn commit_batch(&self, metadata: &BatchMetadata) -> Result<BatchId, StorageError> {
        let mut inner = self.inner.lock();
        if inner.batches.contains_key(&metadata.idempotency_key) {
            return Err(StorageError::DuplicateBatch);
        }
        inner.next_batch_id += 1;
        let batch_id = inner.next_batch_id;
        inner
            .batches
            .insert(metadata.idempotency_key.clone(), (batch_id, metadata.clone()));
        Ok(batch_id)
    }

    fn commit_daily_aggregates(
        &self,
        _batch_id: BatchId,
        aggregates: &[DailyAggregate],
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        for agg in aggregates {
            let key = (agg.subject_ref.clone(), agg.date);
            match inner.daily.get_mut(&key) {
                Some(existing) => existing.merge_additive(agg),
                None => {
                    inner.daily.insert(key, agg.clone());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgate_core::{BucketKey, BucketTotals, Cct, DateRange, Flow, RejectionBreakdown};

    fn metadata(key: &str) -> BatchMetadata {
        let date = NaiveDate::from_ymd_opt(2025, 11, 5).unwrap();
        BatchMetadata {
            subject_ref: "s1".to_string(),
            subject_ref_version: None,
            source: "PAYTM".to_string(),
            idempotency_key: key.to_string(),
            content_hash: "abc".to_string(),
            filename_hash: None,
            file_ext: None,
            rows_accepted: 1,
            rows_rejected: 0,
            rejection_breakdown: RejectionBreakdown::new(),
            accepted_partial_rows: 0,
            declared_range: None,
            inferred_range: DateRange::new(date, date),
            cct_unknown_rate: 0.0,
            payer_token_present: false,
            policy_version: "cct-policy/v1".to_string(),
        }
    }

    fn aggregate(sum: f64, count: u64) -> DailyAggregate {
        let date = NaiveDate::from_ymd_opt(2025, 11, 5).unwrap();
        let mut agg = DailyAggregate::empty("s1", date);
        agg.buckets.insert(
            BucketKey::new(Cct::Free, Flow::In),
            BucketTotals { count, sum },
        );
        agg.unique_payers_count = count;
        agg.recompute_derived();
        agg
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let sink = MemorySink::new();
        let id = sink.commit_batch(&metadata("k1")).unwrap();
        assert_eq!(id, 1);
        assert!(matches!(
            sink.commit_batch(&metadata("k1")),
            Err(StorageError::DuplicateBatch)
        ));
        assert_eq!(sink.batch_count(), 1);
    }

    #[test]
    fn test_batch_ids_increment() {
        let sink = MemorySink::new();
        assert_eq!(sink.commit_batch(&metadata("k1")).unwrap(), 1);
        assert_eq!(sink.commit_batch(&metadata("k2")).unwrap(), 2);
    }

    #[test]
    fn test_repeated_day_merges_additively() {
        let sink = MemorySink::new();
        let date = NaiveDate::from_ymd_opt(2025, 11, 5).unwrap();

        sink.commit_daily_aggregates(1, &[aggregate(100.0, 2)]).unwrap();
        sink.commit_daily_aggregates(2, &[aggregate(50.0, 1)]).unwrap();

        let stored = sink.daily("s1", date).unwrap();
        assert_eq!(stored.bucket(Cct::Free, Flow::In).count, 3);
        assert_eq!(stored.bucket(Cct::Free, Flow::In).sum, 150.0);
        assert_eq!(stored.inflow_sum, 150.0);
        // Upper bound, not a recount
        assert_eq!(stored.unique_payers_count, 3);
    }

    #[test]
    fn test_daily_for_subject_filters() {
        let sink = MemorySink::new();
        sink.commit_daily_aggregates(1, &[aggregate(10.0, 1)]).unwrap();
        let mut other = aggregate(20.0, 1);
        other.subject_ref = "s2".to_string();
        sink.commit_daily_aggregates(2, &[other]).unwrap();

        assert_eq!(sink.daily_for_subject("s1").len(), 1);
        assert_eq!(sink.daily_for_subject("s2").len(), 1);
        assert!(sink.daily_for_subject("s3").is_empty());
    }
}
