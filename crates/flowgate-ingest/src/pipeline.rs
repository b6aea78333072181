//! Batch orchestrator.
//!
//! Drives the pipeline in strict order for each batch:
//! parse → validate → status-gate → normalize → classify → aggregate → key →
//! commit. Rows live only inside one call; every exit path drops them.
//!
//! Guardrails short-circuit before persistence: `EMPTY_BATCH`,
//! `NO_VALID_ROWS`, `LOW_ACCEPT_RATIO`, `DECLARED_RANGE_VIOLATION`. A
//! duplicate idempotency key from the storage port surfaces as
//! `ALREADY_INGESTED`.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate};
use flowgate_core::{
    BatchId, BatchMetadata, CanonicalRecord, Cct, CctResult, DailyAggregate, DateRange,
    RejectionBreakdown, round6,
};
use metrics::{counter, gauge};
use serde_json::{Map, Value};

use crate::adapter::{ParsedBatch, events, tabular};
use crate::aggregate::aggregate_daily;
use crate::classify::{cct, semantic};
use crate::config::PolicyConfig;
use crate::error::{BatchRejectReason, BatchRejection, Error, Result};
use crate::keying;
use crate::normalize::to_canonical;
use crate::storage::{StorageError, StoragePort};
use crate::validate::{gate_status, validate_row};

/// Tabular ingestion request.
#[derive(Debug, Clone)]
pub struct TabularRequest {
    pub subject_ref: String,
    pub subject_ref_version: Option<String>,
    pub source: String,
    pub input_start_date: Option<NaiveDate>,
    pub input_end_date: Option<NaiveDate>,
    /// Original upload name; hashed immediately, never stored or echoed.
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// Event-feed ingestion request.
#[derive(Debug, Clone)]
pub struct FeedRequest {
    pub subject_ref: String,
    pub subject_ref_version: Option<String>,
    pub source: String,
    pub input_start_date: Option<NaiveDate>,
    pub input_end_date: Option<NaiveDate>,
    pub watermark_ts: Option<DateTime<FixedOffset>>,
    pub allow_missing_watermark: bool,
    pub events: Vec<Map<String, Value>>,
}

/// Result of a committed batch.
#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub batch_id: BatchId,
    pub metadata: BatchMetadata,
    pub daily_aggregate_days: u64,
    pub daily_control_days: u64,
    /// Effective watermark (feeds only).
    pub watermark_ts: Option<DateTime<FixedOffset>>,
    /// Whether the watermark was defaulted from the max event timestamp.
    pub watermark_defaulted: bool,
}

/// Row-processing outcome for one batch.
struct ProcessedRows {
    accepted: Vec<(CanonicalRecord, CctResult)>,
    breakdown: RejectionBreakdown,
    accepted_partial_rows: u64,
    payer_token_present: bool,
    unknown_cct_count: u64,
}

impl ProcessedRows {
    fn rows_accepted(&self) -> u64 {
        self.accepted.len() as u64
    }

    fn rows_rejected(&self) -> u64 {
        self.breakdown.total()
    }
}

/// The ingestion orchestrator. Thread-safe; batches may run concurrently,
/// with the storage port as the duplicate-detection serialization point.
pub struct Pipeline {
    port: Arc<dyn StoragePort>,
    policy: PolicyConfig,
}

impl Pipeline {
    pub fn new(port: Arc<dyn StoragePort>, policy: PolicyConfig) -> Self {
        Self { port, policy }
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// Ingest a tabular upload.
    pub fn ingest_tabular(&self, req: TabularRequest) -> Result<IngestReceipt> {
        check_identity(&req.subject_ref, &req.source)?;
        let declared = declared_range(req.input_start_date, req.input_end_date)?;

        let parsed = tabular::parse_tabular(&req.bytes)?;
        let total_rows = parsed.rows.len() as u64;
        let processed = self.process_rows(&req.subject_ref, &parsed);
        self.guard(total_rows, &processed)?;

        let inferred = self.inferred_range(&processed)?;
        check_declared_containment(declared, inferred, &processed)?;
        let key_range = declared.unwrap_or(inferred);
        let idempotency_key = keying::tabular_key(
            &req.subject_ref,
            &req.source,
            &parsed.content_hash,
            &key_range,
        );

        let (filename_hash, file_ext) = file_identity(req.filename.as_deref());
        let aggregates = aggregate_daily(&req.subject_ref, &processed.accepted);
        let metadata = self.build_metadata(
            &req.subject_ref,
            req.subject_ref_version.clone(),
            &req.source,
            idempotency_key,
            parsed.content_hash.clone(),
            filename_hash,
            file_ext,
            declared,
            inferred,
            total_rows,
            &processed,
        );

        let batch_id = self.commit(&metadata, &aggregates)?;
        Ok(IngestReceipt {
            batch_id,
            metadata,
            daily_aggregate_days: aggregates.len() as u64,
            daily_control_days: aggregates.len() as u64,
            watermark_ts: None,
            watermark_defaulted: false,
        })
    }

    /// Ingest an event-feed payload.
    pub fn ingest_feed(&self, req: FeedRequest) -> Result<IngestReceipt> {
        check_identity(&req.subject_ref, &req.source)?;
        let declared = declared_range(req.input_start_date, req.input_end_date)?;

        if req.events.is_empty() {
            counter!("ingest_batches_rejected_total", "reason" => "EMPTY_BATCH").increment(1);
            return Err(BatchRejection::new(BatchRejectReason::EmptyBatch).into());
        }

        if req.watermark_ts.is_none()
            && !(self.policy.allow_missing_watermark && req.allow_missing_watermark)
        {
            return Err(Error::BadRequest("missing watermark_ts".to_string()));
        }

        let parsed = events::parse_events(&req.events);
        let total_rows = parsed.rows.len() as u64;
        let event_count = req.events.len();
        let processed = self.process_rows(&req.subject_ref, &parsed);
        self.guard(total_rows, &processed)?;

        let inferred = self.inferred_range(&processed)?;
        check_declared_containment(declared, inferred, &processed)?;

        let min_ts = keying::min_event_ts(processed.accepted.iter().map(|(r, _)| r))
            .ok_or_else(|| Error::Rejected(BatchRejection::new(BatchRejectReason::NoValidRows)))?;
        let max_ts = keying::max_event_ts(processed.accepted.iter().map(|(r, _)| r))
            .ok_or_else(|| Error::Rejected(BatchRejection::new(BatchRejectReason::NoValidRows)))?;
        let watermark_defaulted = req.watermark_ts.is_none();
        let effective_watermark = req.watermark_ts.unwrap_or(max_ts);

        let idempotency_key = keying::feed_key(
            &req.subject_ref,
            &req.source,
            effective_watermark,
            min_ts,
            max_ts,
            event_count,
            &parsed.content_hash,
        );

        let aggregates = aggregate_daily(&req.subject_ref, &processed.accepted);
        let metadata = self.build_metadata(
            &req.subject_ref,
            req.subject_ref_version.clone(),
            &req.source,
            idempotency_key,
            parsed.content_hash.clone(),
            None,
            None,
            declared,
            inferred,
            total_rows,
            &processed,
        );

        let batch_id = self.commit(&metadata, &aggregates)?;
        Ok(IngestReceipt {
            batch_id,
            metadata,
            daily_aggregate_days: aggregates.len() as u64,
            daily_control_days: aggregates.len() as u64,
            watermark_ts: Some(effective_watermark),
            watermark_defaulted,
        })
    }

    /// Run validate → gate → normalize → classify over every parsed row.
    fn process_rows(&self, subject_ref: &str, parsed: &ParsedBatch) -> ProcessedRows {
        let cct_policy = self.policy.cct_policy();
        let mut out = ProcessedRows {
            accepted: Vec::new(),
            breakdown: RejectionBreakdown::new(),
            accepted_partial_rows: 0,
            payer_token_present: false,
            unknown_cct_count: 0,
        };

        for row in &parsed.rows {
            let valid = match validate_row(row) {
                Ok(valid) => valid,
                Err(reason) => {
                    out.breakdown.bump(reason);
                    continue;
                }
            };
            if parsed.has_status_column {
                if let Some(reason) = gate_status(&valid) {
                    out.breakdown.bump(reason);
                    continue;
                }
            }

            let record = to_canonical(subject_ref, valid);
            if record.partial_record {
                out.accepted_partial_rows += 1;
            }
            if record.payer_token.is_some() || record.raw_counterparty_token.is_some() {
                out.payer_token_present = true;
            }

            let sem = semantic::classify(&record);
            let result = cct::classify(&record, &sem, &cct_policy);
            if result.cct == Cct::Unknown {
                out.unknown_cct_count += 1;
            }
            out.accepted.push((record, result));
        }

        out
    }

    /// Batch guardrails, in order. Nothing persists past a failure here.
    fn guard(&self, total_rows: u64, processed: &ProcessedRows) -> Result<()> {
        if total_rows == 0 {
            counter!("ingest_batches_rejected_total", "reason" => "EMPTY_BATCH").increment(1);
            return Err(BatchRejection::new(BatchRejectReason::EmptyBatch).into());
        }

        let accepted = processed.rows_accepted();
        let rejected = processed.rows_rejected();
        if accepted == 0 {
            counter!("ingest_batches_rejected_total", "reason" => "NO_VALID_ROWS").increment(1);
            return Err(BatchRejection::new(BatchRejectReason::NoValidRows)
                .with_counts(0, rejected, processed.breakdown.clone())
                .into());
        }

        if let Some(min_ratio) = self.policy.min_accept_ratio {
            let ratio = accepted as f64 / total_rows as f64;
            if ratio < min_ratio {
                counter!("ingest_batches_rejected_total", "reason" => "LOW_ACCEPT_RATIO")
                    .increment(1);
                let mut rejection = BatchRejection::new(BatchRejectReason::LowAcceptRatio)
                    .with_counts(accepted, rejected, processed.breakdown.clone());
                rejection.accepted_ratio = Some((ratio * 10_000.0).round() / 10_000.0);
                rejection.min_accept_ratio = Some(min_ratio);
                return Err(rejection.into());
            }
        }

        Ok(())
    }

    fn inferred_range(&self, processed: &ProcessedRows) -> Result<DateRange> {
        keying::infer_date_range(processed.accepted.iter().map(|(r, _)| r))
            .ok_or_else(|| BatchRejection::new(BatchRejectReason::NoValidRows).into())
    }

    #[allow(clippy::too_many_arguments)]
    fn build_metadata(
        &self,
        subject_ref: &str,
        subject_ref_version: Option<String>,
        source: &str,
        idempotency_key: String,
        content_hash: String,
        filename_hash: Option<String>,
        file_ext: Option<String>,
        declared_range: Option<DateRange>,
        inferred_range: DateRange,
        total_rows: u64,
        processed: &ProcessedRows,
    ) -> BatchMetadata {
        let rows_accepted = processed.rows_accepted();
        debug_assert_eq!(rows_accepted + processed.rows_rejected(), total_rows);
        BatchMetadata {
            subject_ref: subject_ref.to_string(),
            subject_ref_version,
            source: source.to_string(),
            idempotency_key,
            content_hash,
            filename_hash,
            file_ext,
            rows_accepted,
            rows_rejected: processed.rows_rejected(),
            rejection_breakdown: processed.breakdown.clone(),
            accepted_partial_rows: processed.accepted_partial_rows,
            declared_range,
            inferred_range,
            cct_unknown_rate: round6(
                processed.unknown_cct_count as f64 / (rows_accepted.max(1)) as f64,
            ),
            payer_token_present: processed.payer_token_present,
            policy_version: self.policy.policy_version.clone(),
        }
    }

    /// Commit through the storage port. The port is the serialization point:
    /// of two concurrent batches with one key, exactly one lands here first.
    fn commit(&self, metadata: &BatchMetadata, aggregates: &[DailyAggregate]) -> Result<BatchId> {
        let batch_id = match self.port.commit_batch(metadata) {
            Ok(batch_id) => batch_id,
            Err(StorageError::DuplicateBatch) => {
                counter!("ingest_batches_duplicate_total").increment(1);
                tracing::info!(
                    subject_ref = %metadata.subject_ref,
                    source = %metadata.source,
                    "duplicate batch refused"
                );
                return Err(Error::AlreadyIngested);
            }
            Err(StorageError::Backend(msg)) => return Err(Error::Storage(msg)),
        };

        self.port
            .commit_daily_aggregates(batch_id, aggregates)
            .map_err(|e| Error::Storage(e.to_string()))?;

        let total = metadata.rows_accepted + metadata.rows_rejected;
        counter!("ingest_batches_total").increment(1);
        counter!("ingest_rows_accepted_total").increment(metadata.rows_accepted);
        counter!("ingest_rows_rejected_total").increment(metadata.rows_rejected);
        counter!("ingest_aggregate_days_total").increment(aggregates.len() as u64);
        gauge!("ingest_last_batch_accept_ratio")
            .set(metadata.rows_accepted as f64 / total.max(1) as f64);

        tracing::info!(
            subject_ref = %metadata.subject_ref,
            source = %metadata.source,
            batch_id,
            rows_accepted = metadata.rows_accepted,
            rows_rejected = metadata.rows_rejected,
            days = aggregates.len(),
            cct_unknown_rate = metadata.cct_unknown_rate,
            "batch committed"
        );

        Ok(batch_id)
    }
}

/// `subject_ref` and `source` must be non-empty.
fn check_identity(subject_ref: &str, source: &str) -> Result<()> {
    if subject_ref.trim().is_empty() {
        return Err(Error::BadRequest("subject_ref must not be empty".to_string()));
    }
    if source.trim().is_empty() {
        return Err(Error::BadRequest("source must not be empty".to_string()));
    }
    Ok(())
}

/// Validate the declared-range pair: both-or-neither, ordered.
fn declared_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Option<DateRange>> {
    match (start, end) {
        (None, None) => Ok(None),
        (Some(start), Some(end)) if start <= end => Ok(Some(DateRange::new(start, end))),
        (Some(_), Some(_)) => Err(Error::BadRequest(
            "input_start_date must be <= input_end_date".to_string(),
        )),
        _ => Err(Error::BadRequest(
            "both input_start_date and input_end_date must be provided".to_string(),
        )),
    }
}

/// Every accepted row must fall inside a declared range when one was given.
fn check_declared_containment(
    declared: Option<DateRange>,
    inferred: DateRange,
    processed: &ProcessedRows,
) -> Result<()> {
    if let Some(declared) = declared {
        if !declared.covers(&inferred) {
            counter!("ingest_batches_rejected_total", "reason" => "DECLARED_RANGE_VIOLATION")
                .increment(1);
            let mut rejection = BatchRejection::new(BatchRejectReason::DeclaredRangeViolation)
                .with_counts(
                    processed.rows_accepted(),
                    processed.rows_rejected(),
                    processed.breakdown.clone(),
                );
            rejection.declared_range = Some(declared);
            rejection.inferred_range = Some(inferred);
            return Err(rejection.into());
        }
    }
    Ok(())
}

/// Hash the upload name and split its extension; the raw name goes no
/// further than this function.
fn file_identity(filename: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(name) = filename.filter(|n| !n.is_empty()) else {
        return (None, None);
    };
    let hash = keying::sha256_hex(name.as_bytes());
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| format!(".{}", ext.to_ascii_lowercase()));
    (Some(hash), ext)
}
