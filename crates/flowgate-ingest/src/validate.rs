//! Row validation and the status/quality gate.
//!
//! Validation runs the ordered checks of the ingestion contract: required
//! field presence, timestamp parseability, positive numeric amount, direction
//! membership, channel membership. The first failure picks the rejection
//! bucket; a row is never double-counted.
//!
//! The status gate runs only on rows that passed validation, and only when
//! the batch schema carries a `record_status` column. `partial_record` never
//! causes rejection.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use flowgate_core::{Channel, Direction, RejectReason};

use crate::adapter::{Column, RowMap};

/// A row that passed validation, with all fields parsed.
#[derive(Debug, Clone)]
pub struct ValidRow {
    pub merchant_id: String,
    pub event_ts: DateTime<FixedOffset>,
    pub amount: f64,
    pub direction: Direction,
    pub channel: Channel,
    /// Normalized status value, when the row carried one.
    pub record_status: Option<String>,
    pub partial_record: bool,
    pub raw_category: Option<String>,
    pub raw_narration: Option<String>,
    pub raw_counterparty_token: Option<String>,
    pub payer_token: Option<String>,
}

/// Validate one row. The first failing check determines the bucket.
pub fn validate_row(row: &RowMap) -> Result<ValidRow, RejectReason> {
    let merchant_id = required(row, Column::MerchantId)?;

    let ts_raw = required(row, Column::Ts)?;
    let event_ts = parse_event_ts(ts_raw).ok_or(RejectReason::InvalidTs)?;

    let amount_raw = required(row, Column::Amount)?;
    let amount: f64 = amount_raw
        .parse()
        .map_err(|_| RejectReason::InvalidAmount)?;
    if !amount.is_finite() || amount <= 0.0 {
        return Err(RejectReason::InvalidAmount);
    }

    let direction_raw = required(row, Column::Direction)?;
    let direction = Direction::parse(&direction_raw.to_ascii_lowercase())
        .ok_or(RejectReason::InvalidDirection)?;

    let channel_raw = required(row, Column::Channel)?;
    let channel =
        Channel::parse(&channel_raw.to_ascii_uppercase()).ok_or(RejectReason::InvalidChannel)?;

    Ok(ValidRow {
        merchant_id: merchant_id.to_string(),
        event_ts,
        amount,
        direction,
        channel,
        record_status: optional(row, Column::RecordStatus).map(normalize_status),
        partial_record: optional(row, Column::PartialRecord)
            .map(parse_boolish)
            .unwrap_or(false),
        raw_category: optional(row, Column::RawCategory).map(str::to_string),
        raw_narration: optional(row, Column::RawNarration).map(str::to_string),
        raw_counterparty_token: optional(row, Column::RawCounterpartyToken).map(str::to_string),
        payer_token: optional(row, Column::PayerToken).map(str::to_string),
    })
}

/// Apply the status gate to a validated row.
///
/// Returns `None` when the row proceeds; otherwise the status bucket it
/// lands in. Only called when the batch schema carries `record_status`.
pub fn gate_status(row: &ValidRow) -> Option<RejectReason> {
    let status = row.record_status.as_deref().unwrap_or("");
    match status {
        "SUCCESS" => None,
        "FAILED_INSUFFICIENT_FUNDS" => Some(RejectReason::FailedInsufficientFunds),
        "FAILED_TIMEOUT" => Some(RejectReason::FailedTimeout),
        "FAILED_NETWORK" => Some(RejectReason::FailedNetwork),
        "INVALID_TOKEN" => Some(RejectReason::InvalidToken),
        _ => Some(RejectReason::UnknownStatus),
    }
}

fn required(row: &RowMap, column: Column) -> Result<&str, RejectReason> {
    match row.get(column).map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(RejectReason::MissingRequiredField),
    }
}

fn optional(row: &RowMap, column: Column) -> Option<&str> {
    row.get(column).map(str::trim).filter(|v| !v.is_empty())
}

/// Parse an event timestamp.
///
/// RFC 3339 with an explicit offset is preferred. Offset-less timestamps
/// (`YYYY-MM-DDTHH:MM:SS[.f]` or with a space separator) are coerced to UTC
/// so every canonical record is timezone-aware.
pub fn parse_event_ts(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive).fixed_offset());
        }
    }
    None
}

/// Normalize a status value: trim, uppercase, `-`/space to `_`.
pub fn normalize_status(raw: &str) -> String {
    raw.trim().to_ascii_uppercase().replace(['-', ' '], "_")
}

/// Lenient boolean parse for the `partial_record` flag.
pub fn parse_boolish(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "t" | "yes" | "y"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(
        merchant: &str,
        ts: &str,
        amount: &str,
        direction: &str,
        channel: &str,
    ) -> RowMap {
        let mut r = RowMap::new();
        r.set(Column::MerchantId, merchant.to_string());
        r.set(Column::Ts, ts.to_string());
        r.set(Column::Amount, amount.to_string());
        r.set(Column::Direction, direction.to_string());
        r.set(Column::Channel, channel.to_string());
        r
    }

    #[test]
    fn test_valid_row() {
        let valid = validate_row(&row("m1", "2025-01-01T00:00:00+05:30", "100.5", "credit", "UPI"))
            .unwrap();
        assert_eq!(valid.merchant_id, "m1");
        assert_eq!(valid.amount, 100.5);
        assert_eq!(valid.direction, Direction::Credit);
        assert_eq!(valid.channel, Channel::Upi);
        assert_eq!(valid.event_ts.offset().local_minus_utc(), 5 * 3600 + 1800);
    }

    #[test]
    fn test_missing_required_field() {
        let result = validate_row(&row("", "2025-01-01T00:00:00+05:30", "10", "credit", "UPI"));
        assert_eq!(result.unwrap_err(), RejectReason::MissingRequiredField);
    }

    #[test]
    fn test_invalid_ts() {
        let result = validate_row(&row("m1", "not-a-date", "10", "credit", "UPI"));
        assert_eq!(result.unwrap_err(), RejectReason::InvalidTs);
    }

    #[test]
    fn test_naive_ts_coerced_to_utc() {
        let valid =
            validate_row(&row("m1", "2025-01-01T10:00:00", "10", "credit", "UPI")).unwrap();
        assert_eq!(valid.event_ts.offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_invalid_amount_buckets() {
        for amount in ["-5", "0", "abc", "NaN"] {
            let result =
                validate_row(&row("m1", "2025-01-01T00:00:00+05:30", amount, "credit", "UPI"));
            assert_eq!(result.unwrap_err(), RejectReason::InvalidAmount, "{amount}");
        }
    }

    #[test]
    fn test_invalid_direction() {
        let result =
            validate_row(&row("m1", "2025-01-01T00:00:00+05:30", "10", "sideways", "UPI"));
        assert_eq!(result.unwrap_err(), RejectReason::InvalidDirection);
    }

    #[test]
    fn test_invalid_channel() {
        let result =
            validate_row(&row("m1", "2025-01-01T00:00:00+05:30", "10", "credit", "CASH"));
        assert_eq!(result.unwrap_err(), RejectReason::InvalidChannel);
    }

    #[test]
    fn test_first_failure_wins() {
        // Bad ts AND bad amount: ts check runs first
        let result = validate_row(&row("m1", "garbage", "-5", "credit", "UPI"));
        assert_eq!(result.unwrap_err(), RejectReason::InvalidTs);
    }

    #[test]
    fn test_direction_and_channel_case_insensitive() {
        let valid =
            validate_row(&row("m1", "2025-01-01T00:00:00+05:30", "10", " CREDIT ", "upi")).unwrap();
        assert_eq!(valid.direction, Direction::Credit);
        assert_eq!(valid.channel, Channel::Upi);
    }

    #[test]
    fn test_status_gate_buckets() {
        let mut base =
            validate_row(&row("m1", "2025-01-01T00:00:00+05:30", "10", "credit", "UPI")).unwrap();

        base.record_status = Some(normalize_status("success"));
        assert_eq!(gate_status(&base), None);

        base.record_status = Some(normalize_status("failed-timeout"));
        assert_eq!(gate_status(&base), Some(RejectReason::FailedTimeout));

        base.record_status = Some(normalize_status("PARTIAL_XYZ"));
        assert_eq!(gate_status(&base), Some(RejectReason::UnknownStatus));

        // Column present but value missing on this row
        base.record_status = None;
        assert_eq!(gate_status(&base), Some(RejectReason::UnknownStatus));
    }

    #[test]
    fn test_parse_boolish() {
        for v in ["1", "true", "T", "Yes", " y "] {
            assert!(parse_boolish(v), "{v}");
        }
        for v in ["0", "false", "no", "", "2"] {
            assert!(!parse_boolish(v), "{v}");
        }
    }
}
