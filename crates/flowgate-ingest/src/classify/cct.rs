//! Cash Control Type classifier.
//!
//! Builds a candidate distribution from independent evidence sources (hard
//! keyword rules, category and narration rules, channel heuristics, and the
//! purpose mapping carrying the semantic confidence), then resolves it:
//!
//! 1. **Ambiguity policy**: if the top two candidates sit in different
//!    buckets within `ambiguity_delta` of each other, emit UNKNOWN.
//! 2. **Threshold policy**: if the winner's confidence is below its bucket
//!    threshold (per-bucket override, else the global minimum), emit UNKNOWN.
//!    A threshold of 0 disables the gate.
//!
//! Equal-bucket ties keep the top candidate.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use flowgate_core::{
    CanonicalRecord, Cct, CctResult, Channel, Direction, PurposeClass, SemanticResult,
};

use super::{contains_any, hint_blob};

/// Thresholds and ambiguity window for CCT resolution.
#[derive(Debug, Clone)]
pub struct CctPolicy {
    /// Global minimum confidence. `0` disables the gate.
    pub min_confidence: f64,
    /// Maximum top-2 gap that still counts as ambiguous.
    pub ambiguity_delta: f64,
    /// Per-bucket threshold overrides.
    pub thresholds: BTreeMap<Cct, f64>,
}

impl Default for CctPolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.70,
            ambiguity_delta: 0.05,
            thresholds: BTreeMap::new(),
        }
    }
}

impl CctPolicy {
    fn threshold_for(&self, cct: Cct) -> f64 {
        self.thresholds.get(&cct).copied().unwrap_or(self.min_confidence)
    }
}

/// Deterministic purpose → CCT mapping.
pub fn purpose_default(purpose: PurposeClass) -> Cct {
    match purpose {
        PurposeClass::Sale => Cct::Free,
        PurposeClass::Inventory | PurposeClass::OpexOrStatutory => Cct::Constrained,
        PurposeClass::SettlementOrFee | PurposeClass::RefundOrReversal => Cct::PassThrough,
        PurposeClass::OwnerTransfer => Cct::Artificial,
        PurposeClass::Reimbursement => Cct::Conditional,
        PurposeClass::Unknown => Cct::Unknown,
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    cct: Cct,
    confidence: f64,
    rule: &'static str,
}

/// Candidates from independent evidence sources, in evidence-priority order.
fn candidates(record: &CanonicalRecord, sem: &SemanticResult) -> Vec<Candidate> {
    let blob = hint_blob(record.raw_category.as_deref(), record.raw_narration.as_deref());
    let mut out = Vec::new();
    let mut push = |cct, confidence, rule| out.push(Candidate { cct, confidence, rule });

    // Hard rules (highest weight)
    if contains_any(&blob, &["settlement", "gateway", "pg", "fee", "commission"]) {
        push(Cct::PassThrough, 0.90, "HARD_SETTLEMENT_FEE");
    }
    if contains_any(&blob, &["refund", "reversal", "chargeback"]) {
        push(Cct::PassThrough, 0.88, "HARD_REFUND_REVERSAL");
    }
    if contains_any(&blob, &["owner", "self", "capital", "withdrawal", "infusion", "director"]) {
        push(Cct::Artificial, 0.90, "HARD_OWNER_TRANSFER");
    }

    // Category rules (medium weight)
    if contains_any(&blob, &["rent", "utility", "electricity", "water", "emi", "gst", "tax"]) {
        push(Cct::Constrained, 0.75, "CAT_OBLIGATION");
    }
    if contains_any(&blob, &["inventory", "stock", "wholesale", "supplier", "procure"]) {
        push(Cct::Constrained, 0.75, "CAT_INVENTORY");
    }
    if contains_any(&blob, &["sale", "invoice", "pos", "order", "revenue"]) {
        push(Cct::Free, 0.75, "CAT_SALE");
    }
    if contains_any(&blob, &["reimbursement", "insurance", "claim", "subsidy", "grant"]) {
        push(Cct::Conditional, 0.72, "CAT_REIMBURSEMENT");
    }

    // Narration rules (medium weight)
    if contains_any(&blob, &["cashback", "promo"]) {
        push(Cct::Conditional, 0.70, "NAR_CASHBACK_PROMO");
    }
    if contains_any(&blob, &["settle", "netting"]) {
        push(Cct::PassThrough, 0.70, "NAR_SETTLEMENT");
    }

    // Channel + direction heuristics (low weight)
    if record.direction == Direction::Debit
        && matches!(record.channel, Channel::NetBanking | Channel::Bank)
    {
        push(Cct::Constrained, 0.60, "HEUR_NETBANK_DEBIT");
    }
    if record.direction == Direction::Credit && record.channel.is_consumer() {
        push(Cct::Free, 0.60, "HEUR_CONSUMER_CREDIT");
    }

    // Purpose mapping carrying the semantic confidence
    let purpose_rule = match sem.purpose_class {
        PurposeClass::Sale => Some("PURPOSE_SALE"),
        PurposeClass::Inventory | PurposeClass::OpexOrStatutory => Some("PURPOSE_OBLIGATION"),
        PurposeClass::SettlementOrFee | PurposeClass::RefundOrReversal => {
            Some("PURPOSE_PASS_THROUGH")
        }
        PurposeClass::OwnerTransfer => Some("PURPOSE_OWNER_TRANSFER"),
        PurposeClass::Reimbursement => Some("PURPOSE_REIMBURSEMENT"),
        PurposeClass::Unknown => None,
    };
    if let Some(rule) = purpose_rule {
        push(purpose_default(sem.purpose_class), sem.base_confidence, rule);
    }

    if out.is_empty() {
        out.push(Candidate {
            cct: Cct::Unknown,
            confidence: 0.50,
            rule: "PURPOSE_UNKNOWN",
        });
    }

    out
}

/// Resolve a record's CCT from its semantic result.
pub fn classify(record: &CanonicalRecord, sem: &SemanticResult, policy: &CctPolicy) -> CctResult {
    let mut cands = candidates(record, sem);
    // Stable sort keeps evidence-priority order among equal confidences
    cands.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let top = cands[0];
    let second = cands.get(1).copied();
    let top2_delta = second.map(|s| top.confidence - s.confidence);

    if let Some(second) = second {
        if second.cct != top.cct && top.confidence - second.confidence <= policy.ambiguity_delta {
            return CctResult {
                cct: Cct::Unknown,
                confidence: top.confidence,
                top2_delta,
                rules_fired: vec![top.rule, second.rule],
            };
        }
    }

    let threshold = policy.threshold_for(top.cct);
    if threshold > 0.0 && top.confidence < threshold {
        return CctResult {
            cct: Cct::Unknown,
            confidence: top.confidence,
            top2_delta,
            rules_fired: vec![top.rule],
        };
    }

    CctResult {
        cct: top.cct,
        confidence: top.confidence,
        top2_delta,
        rules_fired: vec![top.rule],
    }
}
