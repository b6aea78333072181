//! Semantic (role/purpose) classifier.
//!
//! A priority-ordered rule table over the record's ephemeral hints; the first
//! matching rule assigns role, purpose, and a starting confidence. Additive
//! adjustments then reward expected recurrence and penalize conflicting
//! signals, and the result is clamped to `[0, 1]`.

use flowgate_core::{CanonicalRecord, Direction, PurposeClass, RoleClass, SemanticResult};

use super::{contains_any, hint_blob};

const FEE_KEYWORDS: &[&str] = &["fee", "commission"];
const REFUND_KEYWORDS: &[&str] = &["refund", "reversal", "chargeback"];
const OWNER_KEYWORDS: &[&str] = &["owner", "self", "capital", "withdrawal", "infusion", "director"];
const SETTLEMENT_KEYWORDS: &[&str] = &["settlement", "gateway", "payout"];
const SUPPLIER_KEYWORDS: &[&str] = &["supplier", "inventory", "stock", "procure", "wholesale"];
const OBLIGATION_KEYWORDS: &[&str] = &["rent", "utility", "electricity", "water", "emi", "gst", "tax"];
const SALE_KEYWORDS: &[&str] = &["sale", "invoice", "pos", "order", "revenue"];
const REIMBURSEMENT_KEYWORDS: &[&str] = &["reimbursement", "insurance", "claim", "subsidy", "grant"];
const RECURRENCE_KEYWORDS: &[&str] = &["recurring", "standing", "autopay"];

/// Classify one record into (role, purpose, confidence). First match wins.
pub fn classify(record: &CanonicalRecord) -> SemanticResult {
    let blob = hint_blob(record.raw_category.as_deref(), record.raw_narration.as_deref());

    let (role, purpose, base, rule) = if contains_any(&blob, FEE_KEYWORDS) {
        (RoleClass::Platform, PurposeClass::SettlementOrFee, 0.85, "FEE_KEYWORD")
    } else if contains_any(&blob, REFUND_KEYWORDS) {
        (RoleClass::Platform, PurposeClass::RefundOrReversal, 0.85, "REFUND_KEYWORD")
    } else if contains_any(&blob, OWNER_KEYWORDS) {
        (RoleClass::Owner, PurposeClass::OwnerTransfer, 0.80, "OWNER_MARKER")
    } else if contains_any(&blob, SETTLEMENT_KEYWORDS) {
        (RoleClass::Platform, PurposeClass::SettlementOrFee, 0.80, "SETTLEMENT_MARKER")
    } else if contains_any(&blob, SUPPLIER_KEYWORDS) {
        (RoleClass::Supplier, PurposeClass::Inventory, 0.75, "SUPPLIER_KEYWORD")
    } else if contains_any(&blob, OBLIGATION_KEYWORDS) {
        (RoleClass::Obligation, PurposeClass::OpexOrStatutory, 0.75, "OBLIGATION_KEYWORD")
    } else if contains_any(&blob, SALE_KEYWORDS)
        || (record.direction == Direction::Credit && record.channel.is_consumer())
    {
        (RoleClass::Customer, PurposeClass::Sale, 0.70, "SALE_PATTERN")
    } else if contains_any(&blob, REIMBURSEMENT_KEYWORDS) {
        (RoleClass::ThirdParty, PurposeClass::Reimbursement, 0.70, "REIMBURSEMENT_KEYWORD")
    } else {
        (RoleClass::Unknown, PurposeClass::Unknown, 0.30, "NO_SIGNAL")
    };

    let mut confidence: f64 = base;
    let mut rules_fired = vec![rule];
    let recurring = contains_any(&blob, RECURRENCE_KEYWORDS);

    // Recurrence reinforces obligation-like purposes
    if recurring
        && matches!(
            purpose,
            PurposeClass::Inventory | PurposeClass::OpexOrStatutory | PurposeClass::OwnerTransfer
        )
    {
        confidence += 0.15;
        rules_fired.push("RECURRENCE_MATCH");
    }

    // Conflicting signals
    if purpose == PurposeClass::Sale && record.direction == Direction::Debit {
        confidence -= 0.20;
        rules_fired.push("SALE_DEBIT_CONFLICT");
    }
    if recurring && is_large_round(record.amount) && purpose != PurposeClass::OwnerTransfer {
        confidence -= 0.20;
        rules_fired.push("ROUND_RECURRING_CONFLICT");
    }

    SemanticResult {
        role_class: role,
        purpose_class: purpose,
        base_confidence: confidence.clamp(0.0, 1.0),
        rules_fired,
    }
}

/// Round thousands of 10k or more look like owner movements, not trade.
fn is_large_round(amount: f64) -> bool {
    amount >= 10_000.0 && (amount / 1_000.0).fract() == 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use flowgate_core::Channel;

    fn record(
        direction: Direction,
        channel: Channel,
        category: Option<&str>,
        narration: Option<&str>,
    ) -> CanonicalRecord {
        CanonicalRecord {
            subject_ref: "s1".to_string(),
            merchant_id: "m1".to_string(),
            event_ts: DateTime::parse_from_rfc3339("2025-11-05T09:00:00+05:30").unwrap(),
            amount: 100.0,
            direction,
            channel,
            raw_category: category.map(str::to_string),
            raw_narration: narration.map(str::to_string),
            raw_counterparty_token: None,
            payer_token: None,
            partial_record: false,
        }
    }

    #[test]
    fn test_priority_fee_beats_sale() {
        let sem = classify(&record(
            Direction::Credit,
            Channel::Upi,
            Some("sale"),
            Some("gateway fee"),
        ));
        assert_eq!(sem.purpose_class, PurposeClass::SettlementOrFee);
        assert_eq!(sem.base_confidence, 0.85);
        assert_eq!(sem.rules_fired, vec!["FEE_KEYWORD"]);
    }

    #[test]
    fn test_refund_keyword() {
        let sem = classify(&record(
            Direction::Debit,
            Channel::Upi,
            None,
            Some("chargeback"),
        ));
        assert_eq!(sem.purpose_class, PurposeClass::RefundOrReversal);
        assert_eq!(sem.role_class, RoleClass::Platform);
    }

    #[test]
    fn test_owner_marker() {
        let sem = classify(&record(
            Direction::Debit,
            Channel::Bank,
            None,
            Some("owner transfer"),
        ));
        assert_eq!(sem.purpose_class, PurposeClass::OwnerTransfer);
        assert_eq!(sem.base_confidence, 0.80);
    }

    #[test]
    fn test_hintless_consumer_credit_is_sale() {
        let sem = classify(&record(Direction::Credit, Channel::Upi, None, None));
        assert_eq!(sem.purpose_class, PurposeClass::Sale);
        assert_eq!(sem.role_class, RoleClass::Customer);
        assert_eq!(sem.base_confidence, 0.70);
    }

    #[test]
    fn test_hintless_bank_debit_is_unknown() {
        let sem = classify(&record(Direction::Debit, Channel::Bank, None, None));
        assert_eq!(sem.purpose_class, PurposeClass::Unknown);
        assert_eq!(sem.base_confidence, 0.30);
    }

    #[test]
    fn test_recurrence_boost() {
        let sem = classify(&record(
            Direction::Debit,
            Channel::NetBanking,
            Some("rent"),
            Some("standing instruction"),
        ));
        assert_eq!(sem.purpose_class, PurposeClass::OpexOrStatutory);
        assert!((sem.base_confidence - 0.90).abs() < 1e-9);
        assert!(sem.rules_fired.contains(&"RECURRENCE_MATCH"));
    }

    #[test]
    fn test_sale_debit_conflict_penalty() {
        let sem = classify(&record(
            Direction::Debit,
            Channel::Upi,
            Some("sale"),
            None,
        ));
        assert_eq!(sem.purpose_class, PurposeClass::Sale);
        assert!((sem.base_confidence - 0.50).abs() < 1e-9);
        assert!(sem.rules_fired.contains(&"SALE_DEBIT_CONFLICT"));
    }

    #[test]
    fn test_round_recurring_conflict() {
        let mut r = record(
            Direction::Debit,
            Channel::Bank,
            Some("stock"),
            Some("recurring"),
        );
        r.amount = 50_000.0;
        let sem = classify(&r);
        // +0.15 recurrence, -0.20 large-round conflict
        assert!((sem.base_confidence - 0.70).abs() < 1e-9);
        assert!(sem.rules_fired.contains(&"ROUND_RECURRING_CONFLICT"));
    }

    #[test]
    fn test_confidence_clamped() {
        let sem = classify(&record(Direction::Credit, Channel::Upi, None, None));
        assert!((0.0..=1.0).contains(&sem.base_confidence));
    }
}
