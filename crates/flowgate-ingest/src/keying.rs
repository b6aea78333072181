//! Deterministic idempotency keys.
//!
//! A batch key binds subject, source, content, and the effective date range,
//! so re-uploading the same input always lands on the same key and the
//! storage port can refuse the duplicate. `subject_ref_version` is excluded:
//! re-keying an alias must not re-open ingestion.

use chrono::{DateTime, FixedOffset};
use flowgate_core::{CanonicalRecord, DateRange};
use sha2::{Digest, Sha256};

/// Hex SHA-256 of arbitrary bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Idempotency key for a tabular batch.
///
/// Digest over `subject_ref|source|content_hash|key_min_date|key_max_date`,
/// where the key dates are the declared range if supplied, else the inferred
/// range over accepted rows.
pub fn tabular_key(
    subject_ref: &str,
    source: &str,
    content_hash: &str,
    key_range: &DateRange,
) -> String {
    let payload = format!(
        "{subject_ref}|{source}|{content_hash}|{}|{}",
        key_range.start, key_range.end
    );
    sha256_hex(payload.as_bytes())
}

/// Idempotency key for an event-feed batch.
///
/// Digest over `subject_ref|source|watermark_ts|min_ts|max_ts|event_count|content_hash`.
/// Unlike the tabular key, the event bounds keep their full RFC 3339
/// timestamps: two checkpoints over the same calendar days but different
/// intraday windows stay distinct.
pub fn feed_key(
    subject_ref: &str,
    source: &str,
    watermark_ts: DateTime<FixedOffset>,
    min_ts: DateTime<FixedOffset>,
    max_ts: DateTime<FixedOffset>,
    event_count: usize,
    content_hash: &str,
) -> String {
    let payload = format!(
        "{subject_ref}|{source}|{}|{}|{}|{event_count}|{content_hash}",
        watermark_ts.to_rfc3339(),
        min_ts.to_rfc3339(),
        max_ts.to_rfc3339()
    );
    sha256_hex(payload.as_bytes())
}

/// Earliest event timestamp over accepted records (feed key lower bound).
pub fn min_event_ts<'a, I>(records: I) -> Option<DateTime<FixedOffset>>
where
    I: IntoIterator<Item = &'a CanonicalRecord>,
{
    records.into_iter().map(|r| r.event_ts).min()
}

/// Latest event timestamp over accepted records (feed key upper bound and
/// watermark fallback).
pub fn max_event_ts<'a, I>(records: I) -> Option<DateTime<FixedOffset>>
where
    I: IntoIterator<Item = &'a CanonicalRecord>,
{
    records.into_iter().map(|r| r.event_ts).max()
}

/// Calendar-date range covered by accepted records, in each record's own
/// timezone. `None` for an empty batch; the orchestrator rejects those
/// before keying.
pub fn infer_date_range<'a, I>(records: I) -> Option<DateRange>
where
    I: IntoIterator<Item = &'a CanonicalRecord>,
{
    let mut bounds: Option<(chrono::NaiveDate, chrono::NaiveDate)> = None;
    for record in records {
        let day = record.day();
        bounds = Some(match bounds {
            None => (day, day),
            Some((start, end)) => (start.min(day), end.max(day)),
        });
    }
    bounds.map(|(start, end)| DateRange::new(start, end))
}
