//! Normalization of validated rows into canonical records.
//!
//! Pure projection, no side effects. The validator has already parsed every
//! field; this step binds the row to its batch subject and produces the
//! ephemeral [`CanonicalRecord`] the classifiers and aggregator consume.

use flowgate_core::CanonicalRecord;

use crate::validate::ValidRow;

/// Project an accepted validated row into a canonical record.
pub fn to_canonical(subject_ref: &str, row: ValidRow) -> CanonicalRecord {
    CanonicalRecord {
        subject_ref: subject_ref.to_string(),
        merchant_id: row.merchant_id,
        event_ts: row.event_ts,
        amount: row.amount,
        direction: row.direction,
        channel: row.channel,
        raw_category: row.raw_category,
        raw_narration: row.raw_narration,
        raw_counterparty_token: row.raw_counterparty_token,
        payer_token: row.payer_token,
        partial_record: row.partial_record,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Column, RowMap};
    use crate::validate::validate_row;
    use flowgate_core::{Channel, Direction};

    #[test]
    fn test_projection_preserves_fields() {
        let mut raw = RowMap::new();
        raw.set(Column::MerchantId, "m1".to_string());
        raw.set(Column::Ts, "2025-11-05T09:01:00+05:30".to_string());
        raw.set(Column::Amount, "120.50".to_string());
        raw.set(Column::Direction, "credit".to_string());
        raw.set(Column::Channel, "UPI".to_string());
        raw.set(Column::RawCategory, "sale".to_string());
        raw.set(Column::PayerToken, "p1".to_string());
        raw.set(Column::PartialRecord, "true".to_string());

        let record = to_canonical("subj", validate_row(&raw).unwrap());
        assert_eq!(record.subject_ref, "subj");
        assert_eq!(record.merchant_id, "m1");
        assert_eq!(record.amount, 120.50);
        assert_eq!(record.direction, Direction::Credit);
        assert_eq!(record.channel, Channel::Upi);
        assert_eq!(record.raw_category.as_deref(), Some("sale"));
        assert!(record.partial_record);
        assert_eq!(record.day().to_string(), "2025-11-05");
        assert_eq!(record.payer_key(), Some("p1"));
    }

    #[test]
    fn test_day_uses_record_timezone() {
        let mut raw = RowMap::new();
        raw.set(Column::MerchantId, "m1".to_string());
        // 01:30 IST on Nov 6 is still Nov 5 in UTC; the record's own zone wins
        raw.set(Column::Ts, "2025-11-06T01:30:00+05:30".to_string());
        raw.set(Column::Amount, "10".to_string());
        raw.set(Column::Direction, "debit".to_string());
        raw.set(Column::Channel, "BANK".to_string());

        let record = to_canonical("subj", validate_row(&raw).unwrap());
        assert_eq!(record.day().to_string(), "2025-11-06");
    }
}
