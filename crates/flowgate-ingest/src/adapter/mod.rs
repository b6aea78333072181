//! Input adapters.
//!
//! Two adapters share one output shape: a sequence of typed row-maps plus a
//! stable content hash of the input.
//!
//! - [`tabular`] - delimited text uploads (header row + data rows)
//! - [`events`] - structured event-feed payloads
//!
//! Column handling is explicit: only the five required columns and the known
//! optional allow-list survive parsing. Everything else is dropped before any
//! row leaves the adapter, so unexpected raw fields can never travel further
//! down the pipeline.

pub mod events;
pub mod tabular;

/// Known columns of the ingestion contract.
///
/// The discriminant doubles as the slot index inside [`RowMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Column {
    MerchantId = 0,
    Ts = 1,
    Amount = 2,
    Direction = 3,
    Channel = 4,
    RecordStatus = 5,
    PartialRecord = 6,
    RawCategory = 7,
    RawNarration = 8,
    RawCounterpartyToken = 9,
    PayerToken = 10,
}

/// Number of known columns.
pub const COLUMN_COUNT: usize = 11;

impl Column {
    /// Columns every batch must carry.
    pub const REQUIRED: [Column; 5] = [
        Column::MerchantId,
        Column::Ts,
        Column::Amount,
        Column::Direction,
        Column::Channel,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::MerchantId => "merchant_id",
            Self::Ts => "ts",
            Self::Amount => "amount",
            Self::Direction => "direction",
            Self::Channel => "channel",
            Self::RecordStatus => "record_status",
            Self::PartialRecord => "partial_record",
            Self::RawCategory => "raw_category",
            Self::RawNarration => "raw_narration",
            Self::RawCounterpartyToken => "raw_counterparty_token",
            Self::PayerToken => "payer_token",
        }
    }

    /// Map a header/field name onto a known column. Unknown names are dropped.
    pub fn from_header(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "merchant_id" => Some(Self::MerchantId),
            "ts" => Some(Self::Ts),
            "amount" => Some(Self::Amount),
            "direction" => Some(Self::Direction),
            "channel" => Some(Self::Channel),
            "record_status" => Some(Self::RecordStatus),
            "partial_record" => Some(Self::PartialRecord),
            "raw_category" => Some(Self::RawCategory),
            "raw_narration" => Some(Self::RawNarration),
            "raw_counterparty_token" => Some(Self::RawCounterpartyToken),
            "payer_token" => Some(Self::PayerToken),
            _ => None,
        }
    }
}

/// One parsed row: a typed map from known columns to raw string values.
///
/// Values are stored exactly as they appeared in the input; trimming and
/// empty-as-missing handling happen in the validator.
#[derive(Debug, Clone, Default)]
pub struct RowMap {
    slots: [Option<String>; COLUMN_COUNT],
}

impl RowMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: Column, value: String) {
        self.slots[column as usize] = Some(value);
    }

    pub fn get(&self, column: Column) -> Option<&str> {
        self.slots[column as usize].as_deref()
    }
}

/// Adapter output: rows plus batch-level schema facts and the content hash.
#[derive(Debug, Clone)]
pub struct ParsedBatch {
    pub rows: Vec<RowMap>,
    /// Whether the batch schema carried a `record_status` column/field.
    pub has_status_column: bool,
    /// Stable hex digest of the raw bytes (tabular) or the canonical
    /// serialization of the payload (events).
    pub content_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_header_known_and_unknown() {
        assert_eq!(Column::from_header("merchant_id"), Some(Column::MerchantId));
        assert_eq!(Column::from_header(" TS "), Some(Column::Ts));
        assert_eq!(Column::from_header("raw_note"), None);
    }

    #[test]
    fn test_row_map_slots() {
        let mut row = RowMap::new();
        row.set(Column::Amount, "10.5".to_string());
        assert_eq!(row.get(Column::Amount), Some("10.5"));
        assert_eq!(row.get(Column::Channel), None);
    }
}
