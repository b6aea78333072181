//! Canonical transaction model and derived record types.
//!
//! The types split into two families:
//!
//! - **Ephemeral**: [`CanonicalRecord`], [`SemanticResult`], [`CctResult`].
//!   These live only for the duration of one ingestion request and are never
//!   serialized. `CanonicalRecord` intentionally does not derive `Serialize`.
//! - **Derived / persisted**: [`BatchMetadata`], [`DailyAggregate`]. These are
//!   the only record shapes a storage port may accept, and they carry no
//!   per-row content, identifiers, narrations, or file names.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize, Serializer};

use crate::{EPSILON, round2, round6};

// ═══════════════════════════════════════════════════════════════════════════
// Enumerations
// ═══════════════════════════════════════════════════════════════════════════

/// Flow direction of a transaction from the merchant's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    /// Parse a normalized (trimmed, lowercased) direction string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(Self::Credit),
            "debit" => Some(Self::Debit),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }

    /// The aggregate flow leg this direction feeds.
    pub fn flow(self) -> Flow {
        match self {
            Self::Credit => Flow::In,
            Self::Debit => Flow::Out,
        }
    }
}

/// Payment channel the transaction arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Upi,
    Card,
    Bank,
    NetBanking,
    Wallet,
    CodSettlement,
}

impl Channel {
    /// Parse a normalized (trimmed, uppercased) channel string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UPI" => Some(Self::Upi),
            "CARD" => Some(Self::Card),
            "BANK" => Some(Self::Bank),
            "NET_BANKING" => Some(Self::NetBanking),
            "WALLET" => Some(Self::Wallet),
            "COD_SETTLEMENT" => Some(Self::CodSettlement),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upi => "UPI",
            Self::Card => "CARD",
            Self::Bank => "BANK",
            Self::NetBanking => "NET_BANKING",
            Self::Wallet => "WALLET",
            Self::CodSettlement => "COD_SETTLEMENT",
        }
    }

    /// Channels where a credit typically means a consumer paying the merchant.
    pub fn is_consumer(self) -> bool {
        matches!(self, Self::Upi | Self::Card | Self::Wallet)
    }
}

/// Aggregate flow leg: money in or money out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flow {
    In,
    Out,
}

impl Flow {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
        }
    }

    pub const ALL: [Flow; 2] = [Flow::In, Flow::Out];
}

/// Cash Control Type: how constrained a unit of cash flow is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Cct {
    Free,
    Constrained,
    PassThrough,
    Artificial,
    Conditional,
    Unknown,
}

impl Cct {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Constrained => "CONSTRAINED",
            Self::PassThrough => "PASS_THROUGH",
            Self::Artificial => "ARTIFICIAL",
            Self::Conditional => "CONDITIONAL",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parse an uppercased bucket name (threshold override keys).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FREE" => Some(Self::Free),
            "CONSTRAINED" => Some(Self::Constrained),
            "PASS_THROUGH" => Some(Self::PassThrough),
            "ARTIFICIAL" => Some(Self::Artificial),
            "CONDITIONAL" => Some(Self::Conditional),
            "UNKNOWN" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub const ALL: [Cct; 6] = [
        Cct::Free,
        Cct::Constrained,
        Cct::PassThrough,
        Cct::Artificial,
        Cct::Conditional,
        Cct::Unknown,
    ];
}

/// Counterparty role inferred from ephemeral hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleClass {
    Owner,
    Supplier,
    Obligation,
    Platform,
    Customer,
    ThirdParty,
    Unknown,
}

/// Transaction purpose inferred from ephemeral hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PurposeClass {
    Sale,
    Inventory,
    OpexOrStatutory,
    SettlementOrFee,
    RefundOrReversal,
    OwnerTransfer,
    Reimbursement,
    Unknown,
}

/// Per-row rejection buckets. Counted only; row content is never retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    MissingRequiredField,
    InvalidTs,
    InvalidAmount,
    InvalidDirection,
    InvalidChannel,
    FailedInsufficientFunds,
    FailedTimeout,
    FailedNetwork,
    InvalidToken,
    UnknownStatus,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            Self::InvalidTs => "INVALID_TS",
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::InvalidDirection => "INVALID_DIRECTION",
            Self::InvalidChannel => "INVALID_CHANNEL",
            Self::FailedInsufficientFunds => "FAILED_INSUFFICIENT_FUNDS",
            Self::FailedTimeout => "FAILED_TIMEOUT",
            Self::FailedNetwork => "FAILED_NETWORK",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::UnknownStatus => "UNKNOWN_STATUS",
        }
    }
}

/// Counted rejection buckets for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RejectionBreakdown(BTreeMap<RejectReason, u64>);

impl RejectionBreakdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&mut self, reason: RejectReason) {
        *self.0.entry(reason).or_insert(0) += 1;
    }

    pub fn get(&self, reason: RejectReason) -> u64 {
        self.0.get(&reason).copied().unwrap_or(0)
    }

    /// Total rejected rows across all buckets.
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RejectReason, u64)> + '_ {
        self.0.iter().map(|(r, c)| (*r, *c))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Ephemeral records
// ═══════════════════════════════════════════════════════════════════════════

/// Canonical normalized transaction.
///
/// Exists only inside one ingestion request. Invariants are enforced by the
/// row validator before construction: `amount > 0`, `event_ts` carries an
/// offset, `subject_ref` is non-empty, direction and channel are in range.
///
/// Not `Serialize` on purpose: raw rows must never reach storage or responses.
#[derive(Debug, Clone)]
pub struct CanonicalRecord {
    pub subject_ref: String,
    /// Source-side merchant identifier. Validation-only; never persisted.
    pub merchant_id: String,
    pub event_ts: DateTime<FixedOffset>,
    pub amount: f64,
    pub direction: Direction,
    pub channel: Channel,
    pub raw_category: Option<String>,
    pub raw_narration: Option<String>,
    pub raw_counterparty_token: Option<String>,
    pub payer_token: Option<String>,
    pub partial_record: bool,
}

impl CanonicalRecord {
    /// Calendar day of the event in its own timezone.
    pub fn day(&self) -> NaiveDate {
        self.event_ts.date_naive()
    }

    /// The token used for distinct-payer cardinality, if any.
    pub fn payer_key(&self) -> Option<&str> {
        self.raw_counterparty_token
            .as_deref()
            .or(self.payer_token.as_deref())
            .filter(|t| !t.is_empty())
    }
}

/// Output of the semantic (role/purpose) classifier.
#[derive(Debug, Clone)]
pub struct SemanticResult {
    pub role_class: RoleClass,
    pub purpose_class: PurposeClass,
    /// Confidence in `[0, 1]` after adjustments.
    pub base_confidence: f64,
    /// Rule labels, for in-memory explainability only.
    pub rules_fired: Vec<&'static str>,
}

/// Output of the CCT classifier.
#[derive(Debug, Clone)]
pub struct CctResult {
    pub cct: Cct,
    pub confidence: f64,
    /// Confidence gap between the top two candidates, when a second exists.
    pub top2_delta: Option<f64>,
    pub rules_fired: Vec<&'static str>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Derived / persisted records
// ═══════════════════════════════════════════════════════════════════════════

/// Identifier assigned by the storage port on commit.
pub type BatchId = u64;

/// Inclusive calendar-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Whether `other` lies entirely inside this range.
    pub fn covers(&self, other: &DateRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Per-batch derived metadata. The only batch-shaped record a port may store.
#[derive(Debug, Clone, Serialize)]
pub struct BatchMetadata {
    pub subject_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_ref_version: Option<String>,
    pub source: String,
    pub idempotency_key: String,
    pub content_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_ext: Option<String>,
    pub rows_accepted: u64,
    pub rows_rejected: u64,
    pub rejection_breakdown: RejectionBreakdown,
    pub accepted_partial_rows: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_range: Option<DateRange>,
    pub inferred_range: DateRange,
    pub cct_unknown_rate: f64,
    pub payer_token_present: bool,
    pub policy_version: String,
}

/// Key of one of the twelve control buckets, e.g. `FREE_IN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    pub cct: Cct,
    pub flow: Flow,
}

impl BucketKey {
    pub fn new(cct: Cct, flow: Flow) -> Self {
        Self { cct, flow }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.cct.as_str(), self.flow.as_str())
    }
}

impl Serialize for BucketKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Count and sum for one control bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BucketTotals {
    pub count: u64,
    pub sum: f64,
}

/// Per-day derived aggregate, keyed by `(subject_ref, date)`.
///
/// All twelve control buckets are always present (zero-filled). Sums are
/// rounded to 2 decimals, ratios to 6.
#[derive(Debug, Clone, Serialize)]
pub struct DailyAggregate {
    pub subject_ref: String,
    pub date: NaiveDate,
    pub inflow_sum: f64,
    pub outflow_sum: f64,
    pub buckets: BTreeMap<BucketKey, BucketTotals>,
    pub free_cash_net: f64,
    pub owner_dependency_ratio: f64,
    pub pass_through_ratio: f64,
    pub unknown_flow_ratio: f64,
    pub unique_payers_count: u64,
    pub accepted_partial_rows: u64,
    pub unknown_cct_count: u64,
}

impl DailyAggregate {
    /// A zeroed aggregate with all twelve buckets present.
    pub fn empty(subject_ref: &str, date: NaiveDate) -> Self {
        let mut buckets = BTreeMap::new();
        for cct in Cct::ALL {
            for flow in Flow::ALL {
                buckets.insert(BucketKey::new(cct, flow), BucketTotals::default());
            }
        }
        Self {
            subject_ref: subject_ref.to_string(),
            date,
            inflow_sum: 0.0,
            outflow_sum: 0.0,
            buckets,
            free_cash_net: 0.0,
            owner_dependency_ratio: 0.0,
            pass_through_ratio: 0.0,
            unknown_flow_ratio: 0.0,
            unique_payers_count: 0,
            accepted_partial_rows: 0,
            unknown_cct_count: 0,
        }
    }

    pub fn bucket(&self, cct: Cct, flow: Flow) -> BucketTotals {
        self.buckets
            .get(&BucketKey::new(cct, flow))
            .copied()
            .unwrap_or_default()
    }

    /// Total accepted rows this day (sum of all bucket counts).
    pub fn rows_accepted(&self) -> u64 {
        self.buckets.values().map(|b| b.count).sum()
    }

    pub fn total_in(&self) -> f64 {
        self.buckets
            .iter()
            .filter(|(k, _)| k.flow == Flow::In)
            .map(|(_, b)| b.sum)
            .sum()
    }

    pub fn total_out(&self) -> f64 {
        self.buckets
            .iter()
            .filter(|(k, _)| k.flow == Flow::Out)
            .map(|(_, b)| b.sum)
            .sum()
    }

    /// Recompute `free_cash_net` and the ratio fields from the bucket totals.
    pub fn recompute_derived(&mut self) {
        let total_in = self.total_in();
        let total_out = self.total_out();
        let total_flow = total_in + total_out;

        let free_in = self.bucket(Cct::Free, Flow::In).sum;
        let free_out = self.bucket(Cct::Free, Flow::Out).sum;
        let artificial_in = self.bucket(Cct::Artificial, Flow::In).sum;
        let pass_through = self.bucket(Cct::PassThrough, Flow::In).sum
            + self.bucket(Cct::PassThrough, Flow::Out).sum;
        let unknown = self.bucket(Cct::Unknown, Flow::In).sum
            + self.bucket(Cct::Unknown, Flow::Out).sum;

        self.inflow_sum = round2(total_in);
        self.outflow_sum = round2(total_out);
        self.free_cash_net = round2(free_in - free_out);
        self.owner_dependency_ratio = round6(artificial_in / total_in.max(EPSILON));
        self.pass_through_ratio = round6(pass_through / total_flow.max(EPSILON));
        self.unknown_flow_ratio = round6(unknown / total_flow.max(EPSILON));
    }

    /// Additive merge for repeated-day upserts.
    ///
    /// Sums and counts add; derived fields are recomputed from the merged
    /// buckets. `unique_payers_count` adds as an upper bound, since the
    /// per-day token set is discarded after the original pass.
    pub fn merge_additive(&mut self, other: &DailyAggregate) {
        for (key, totals) in &other.buckets {
            let entry = self.buckets.entry(*key).or_default();
            entry.count += totals.count;
            entry.sum = round2(entry.sum + totals.sum);
        }
        self.unique_payers_count += other.unique_payers_count;
        self.accepted_partial_rows += other.accepted_partial_rows;
        self.unknown_cct_count += other.unknown_cct_count;
        self.recompute_derived();
    }
}
