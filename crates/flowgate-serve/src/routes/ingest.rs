//! Ingestion endpoints.
//!
//! Classification and aggregation are CPU-bound, so both handlers hand the
//! assembled request to the pipeline on a blocking thread. If the caller
//! disconnects before commit, the request future is dropped and nothing is
//! persisted; all pipeline state is request-local.

use axum::Json;
use axum::extract::{Multipart, State};
use chrono::{DateTime, FixedOffset, NaiveDate};
use flowgate_core::{DateRange, RejectionBreakdown};
use flowgate_ingest::{FeedRequest, IngestReceipt, TabularRequest};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::state::AppState;

/// Derived-only status marker on every success response.
const STATUS_INGESTED: &str = "INGESTED_DERIVED_ONLY";

// ═══════════════════════════════════════════════════════════════════════════
// Tabular ingestion
// ═══════════════════════════════════════════════════════════════════════════

/// Response for `POST /v1/ingest/files`.
#[derive(Debug, Clone, Serialize)]
pub struct FileIngestResponse {
    pub status: &'static str,
    pub batch_id: u64,
    pub subject_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_ref_version: Option<String>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_ext: Option<String>,
    pub content_hash: String,
    pub idempotency_key: String,
    pub rows_accepted: u64,
    pub rows_rejected: u64,
    pub rejection_breakdown: RejectionBreakdown,
    pub accepted_partial_rows: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_range: Option<DateRange>,
    pub inferred_range: DateRange,
    pub daily_aggregate_days: u64,
    pub daily_control_days: u64,
    pub cct_unknown_rate: f64,
    pub payer_token_present: bool,
}

impl From<IngestReceipt> for FileIngestResponse {
    fn from(receipt: IngestReceipt) -> Self {
        let m = receipt.metadata;
        Self {
            status: STATUS_INGESTED,
            batch_id: receipt.batch_id,
            subject_ref: m.subject_ref,
            subject_ref_version: m.subject_ref_version,
            source: m.source,
            filename_hash: m.filename_hash,
            file_ext: m.file_ext,
            content_hash: m.content_hash,
            idempotency_key: m.idempotency_key,
            rows_accepted: m.rows_accepted,
            rows_rejected: m.rows_rejected,
            rejection_breakdown: m.rejection_breakdown,
            accepted_partial_rows: m.accepted_partial_rows,
            declared_range: m.declared_range,
            inferred_range: m.inferred_range,
            daily_aggregate_days: receipt.daily_aggregate_days,
            daily_control_days: receipt.daily_control_days,
            cct_unknown_rate: m.cct_unknown_rate,
            payer_token_present: m.payer_token_present,
        }
    }
}

/// `POST /v1/ingest/files`
///
/// Multipart fields: `subject_ref`, `subject_ref_version?`, `source`,
/// `input_start_date?`, `input_end_date?`, `file`. The upload name is
/// hashed immediately; only `filename_hash` and `file_ext` survive.
pub async fn ingest_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<FileIngestResponse>, ApiError> {
    let mut subject_ref = None;
    let mut subject_ref_version = None;
    let mut source = None;
    let mut input_start_date = None;
    let mut input_end_date = None;
    let mut file: Option<(Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let read_text = |name: &'static str| {
            move |e: axum::extract::multipart::MultipartError| {
                ApiError::BadRequest(format!("unreadable field {name}: {e}"))
            }
        };
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("subject_ref") => {
                subject_ref = Some(field.text().await.map_err(read_text("subject_ref"))?);
            }
            Some("subject_ref_version") => {
                let value = field.text().await.map_err(read_text("subject_ref_version"))?;
                subject_ref_version = (!value.is_empty()).then_some(value);
            }
            Some("source") => {
                source = Some(field.text().await.map_err(read_text("source"))?);
            }
            Some("input_start_date") => {
                let value = field.text().await.map_err(read_text("input_start_date"))?;
                input_start_date = parse_date_field("input_start_date", &value)?;
            }
            Some("input_end_date") => {
                let value = field.text().await.map_err(read_text("input_end_date"))?;
                input_end_date = parse_date_field("input_end_date", &value)?;
            }
            Some("file") => {
                let filename = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("unreadable file field: {e}")))?;
                file = Some((filename, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let subject_ref =
        subject_ref.ok_or_else(|| ApiError::BadRequest("subject_ref is required".to_string()))?;
    let source = source.ok_or_else(|| ApiError::BadRequest("source is required".to_string()))?;
    let (filename, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("file is required".to_string()))?;

    let request = TabularRequest {
        subject_ref,
        subject_ref_version,
        source,
        input_start_date,
        input_end_date,
        filename,
        bytes,
    };

    let pipeline = state.pipeline.clone();
    let receipt = tokio::task::spawn_blocking(move || pipeline.ingest_tabular(request))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))??;

    Ok(Json(receipt.into()))
}

// ═══════════════════════════════════════════════════════════════════════════
// Feed ingestion
// ═══════════════════════════════════════════════════════════════════════════

/// Request body for `POST /v1/ingest/feeds`. Unknown event keys are dropped
/// by the adapter before any row enters the pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedIngestRequest {
    pub subject_ref: String,
    #[serde(default)]
    pub subject_ref_version: Option<String>,
    pub source: String,
    /// Upstream checkpoint for this batch. Required unless the dev override
    /// is enabled both server-side and per-request.
    #[serde(default)]
    pub watermark_ts: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub allow_missing_watermark: bool,
    #[serde(default)]
    pub input_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub input_end_date: Option<NaiveDate>,
    pub events: Vec<Map<String, Value>>,
}

/// Response for `POST /v1/ingest/feeds`.
#[derive(Debug, Clone, Serialize)]
pub struct FeedIngestResponse {
    pub status: &'static str,
    pub batch_id: u64,
    pub subject_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_ref_version: Option<String>,
    pub source: String,
    pub content_hash: String,
    pub idempotency_key: String,
    pub rows_accepted: u64,
    pub rows_rejected: u64,
    pub rejection_breakdown: RejectionBreakdown,
    pub accepted_partial_rows: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_range: Option<DateRange>,
    pub inferred_range: DateRange,
    pub watermark_ts: String,
    /// Present when the watermark was defaulted from the max event timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_watermark_ts: Option<String>,
    pub daily_aggregate_days: u64,
    pub daily_control_days: u64,
    pub cct_unknown_rate: f64,
    pub payer_token_present: bool,
}

/// `POST /v1/ingest/feeds`
pub async fn ingest_feed(
    State(state): State<AppState>,
    Json(body): Json<FeedIngestRequest>,
) -> Result<Json<FeedIngestResponse>, ApiError> {
    let request = FeedRequest {
        subject_ref: body.subject_ref,
        subject_ref_version: body.subject_ref_version,
        source: body.source,
        input_start_date: body.input_start_date,
        input_end_date: body.input_end_date,
        watermark_ts: body.watermark_ts,
        allow_missing_watermark: body.allow_missing_watermark,
        events: body.events,
    };

    let pipeline = state.pipeline.clone();
    let receipt = tokio::task::spawn_blocking(move || pipeline.ingest_feed(request))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))??;

    let watermark = receipt
        .watermark_ts
        .map(|ts| ts.to_rfc3339())
        .unwrap_or_default();
    let effective_watermark_ts = receipt.watermark_defaulted.then(|| watermark.clone());

    let m = receipt.metadata;
    Ok(Json(FeedIngestResponse {
        status: STATUS_INGESTED,
        batch_id: receipt.batch_id,
        subject_ref: m.subject_ref,
        subject_ref_version: m.subject_ref_version,
        source: m.source,
        content_hash: m.content_hash,
        idempotency_key: m.idempotency_key,
        rows_accepted: m.rows_accepted,
        rows_rejected: m.rows_rejected,
        rejection_breakdown: m.rejection_breakdown,
        accepted_partial_rows: m.accepted_partial_rows,
        declared_range: m.declared_range,
        inferred_range: m.inferred_range,
        watermark_ts: watermark,
        effective_watermark_ts,
        daily_aggregate_days: receipt.daily_aggregate_days,
        daily_control_days: receipt.daily_control_days,
        cct_unknown_rate: m.cct_unknown_rate,
        payer_token_present: m.payer_token_present,
    }))
}

/// Parse an optional ISO calendar date form field. Empty means absent.
fn parse_date_field(name: &str, value: &str) -> Result<Option<NaiveDate>, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<NaiveDate>()
        .map(Some)
        .map_err(|_| ApiError::BadRequest(format!("{name} must be an ISO date (YYYY-MM-DD)")))
}
