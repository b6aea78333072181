//! Daily control-bucket aggregation.
//!
//! Accumulates classified records into per-day bucket counts and sums, keyed
//! by the record's calendar day in its own timezone. Distinct payer tokens
//! are tracked in a per-day set that is discarded after the pass; only the
//! cardinality survives into the persisted aggregate.
//!
//! Accumulators combine associatively, so a day-partitioned run folds to the
//! same output as a sequential one.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use flowgate_core::{BucketKey, CanonicalRecord, Cct, CctResult, DailyAggregate, Flow, round2};

/// In-progress totals for one day. Ephemeral; holds the payer-token set.
#[derive(Debug, Default)]
pub struct DayAccumulator {
    counts: BTreeMap<BucketKey, u64>,
    sums: BTreeMap<BucketKey, f64>,
    inflow: f64,
    outflow: f64,
    payers: BTreeSet<String>,
    partial_rows: u64,
    unknown_rows: u64,
}

impl DayAccumulator {
    pub fn observe(&mut self, record: &CanonicalRecord, cct: &CctResult) {
        let key = BucketKey::new(cct.cct, record.direction.flow());
        *self.counts.entry(key).or_insert(0) += 1;
        *self.sums.entry(key).or_insert(0.0) += record.amount;

        match record.direction.flow() {
            Flow::In => self.inflow += record.amount,
            Flow::Out => self.outflow += record.amount,
        }

        if cct.cct == Cct::Unknown {
            self.unknown_rows += 1;
        }
        if record.partial_record {
            self.partial_rows += 1;
        }
        if let Some(token) = record.payer_key() {
            self.payers.insert(token.to_string());
        }
    }

    /// Fold another accumulator into this one (day-partitioned runs).
    pub fn combine(&mut self, other: DayAccumulator) {
        for (key, count) in other.counts {
            *self.counts.entry(key).or_insert(0) += count;
        }
        for (key, sum) in other.sums {
            *self.sums.entry(key).or_insert(0.0) += sum;
        }
        self.inflow += other.inflow;
        self.outflow += other.outflow;
        self.payers.extend(other.payers);
        self.partial_rows += other.partial_rows;
        self.unknown_rows += other.unknown_rows;
    }

    /// Finalize into the persisted aggregate shape. The payer set dies here.
    pub fn finish(self, subject_ref: &str, date: NaiveDate) -> DailyAggregate {
        let mut agg = DailyAggregate::empty(subject_ref, date);
        for (key, bucket) in agg.buckets.iter_mut() {
            bucket.count = self.counts.get(key).copied().unwrap_or(0);
            bucket.sum = round2(self.sums.get(key).copied().unwrap_or(0.0));
        }
        agg.unique_payers_count = self.payers.len() as u64;
        agg.accepted_partial_rows = self.partial_rows;
        agg.unknown_cct_count = self.unknown_rows;
        agg.recompute_derived();
        agg
    }
}

/// Aggregate classified records into one `DailyAggregate` per active day,
/// sorted by date. Days with no accepted rows produce no row.
pub fn aggregate_daily(
    subject_ref: &str,
    classified: &[(CanonicalRecord, CctResult)],
) -> Vec<DailyAggregate> {
    let mut days: BTreeMap<NaiveDate, DayAccumulator> = BTreeMap::new();
    for (record, cct) in classified {
        days.entry(record.day()).or_default().observe(record, cct);
    }
    days.into_iter()
        .map(|(date, acc)| acc.finish(subject_ref, date))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{CctPolicy, cct, semantic};
    use chrono::DateTime;
    use flowgate_core::{Channel, Direction, Flow};

    fn evt(
        ts: &str,
        amount: f64,
        direction: Direction,
        channel: Channel,
        category: Option<&str>,
        narration: Option<&str>,
        payer: Option<&str>,
        partial: bool,
    ) -> CanonicalRecord {
        CanonicalRecord {
            subject_ref: "s1".to_string(),
            merchant_id: "m1".to_string(),
            event_ts: DateTime::parse_from_rfc3339(ts).unwrap(),
            amount,
            direction,
            channel,
            raw_category: category.map(str::to_string),
            raw_narration: narration.map(str::to_string),
            raw_counterparty_token: payer.map(str::to_string),
            payer_token: None,
            partial_record: partial,
        }
    }

    fn classify_all(records: Vec<CanonicalRecord>) -> Vec<(CanonicalRecord, CctResult)> {
        let policy = CctPolicy::default();
        records
            .into_iter()
            .map(|r| {
                let sem = semantic::classify(&r);
                let result = cct::classify(&r, &sem, &policy);
                (r, result)
            })
            .collect()
    }

    /// Spread `total` across `count` two-decimal amounts that sum exactly.
    fn split_amount(total: f64, count: usize) -> Vec<f64> {
        let base = round2(total / count as f64);
        let mut amounts = vec![base; count];
        let partial: f64 = amounts[..count - 1].iter().sum();
        amounts[count - 1] = round2(total - partial);
        amounts
    }

    const DAY: &str = "2026-01-15T10:00:00+00:00";

    #[test]
    fn test_daily_control_worked_example() {
        let mut events = Vec::new();

        // FREE_IN: 92 sale credits, 68450.25 total; 61 unique payers; 3 partial
        for (i, amt) in split_amount(68450.25, 92).into_iter().enumerate() {
            let payer = if i < 61 { Some(format!("p{i}")) } else { None };
            events.push(evt(
                DAY,
                amt,
                Direction::Credit,
                Channel::Upi,
                Some("sale"),
                None,
                payer.as_deref(),
                i < 3,
            ));
        }
        // FREE_OUT: 1 sale debit
        events.push(evt(DAY, 320.00, Direction::Debit, Channel::Upi, Some("sale"), None, None, false));
        // CONSTRAINED_OUT: 3 rent debits, 42150.00 total
        for amt in split_amount(42150.00, 3) {
            events.push(evt(DAY, amt, Direction::Debit, Channel::Upi, Some("rent"), None, None, false));
        }
        // PASS_THROUGH_IN: 2 settlement credits, 8000.00 total
        for amt in split_amount(8000.00, 2) {
            events.push(evt(DAY, amt, Direction::Credit, Channel::Upi, None, Some("settlement"), None, false));
        }
        // PASS_THROUGH_OUT: 1 settlement debit
        events.push(evt(DAY, 1200.00, Direction::Debit, Channel::Upi, None, Some("settlement"), None, false));
        // ARTIFICIAL_OUT: 1 owner transfer
        events.push(evt(DAY, 2500.00, Direction::Debit, Channel::Upi, None, Some("owner transfer"), None, false));
        // UNKNOWN_IN: 4 hintless bank credits, 950.00 total
        for amt in split_amount(950.00, 4) {
            events.push(evt(DAY, amt, Direction::Credit, Channel::Bank, None, None, None, false));
        }

        let total_rows = events.len() as u64;
        let aggs = aggregate_daily("s1", &classify_all(events));
        assert_eq!(aggs.len(), 1);
        let day = &aggs[0];
        assert_eq!(day.date.to_string(), "2026-01-15");

        assert_eq!(day.bucket(Cct::Free, Flow::In).count, 92);
        assert_eq!(day.bucket(Cct::Free, Flow::Out).count, 1);
        assert_eq!(day.bucket(Cct::Constrained, Flow::Out).count, 3);
        assert_eq!(day.bucket(Cct::PassThrough, Flow::In).count, 2);
        assert_eq!(day.bucket(Cct::PassThrough, Flow::Out).count, 1);
        assert_eq!(day.bucket(Cct::Artificial, Flow::Out).count, 1);
        assert_eq!(day.bucket(Cct::Unknown, Flow::In).count, 4);

        let close = |a: f64, b: f64| (a - b).abs() < 1e-6;
        assert!(close(day.bucket(Cct::Free, Flow::In).sum, 68450.25));
        assert!(close(day.bucket(Cct::Free, Flow::Out).sum, 320.00));
        assert!(close(day.bucket(Cct::Constrained, Flow::Out).sum, 42150.00));
        assert!(close(day.bucket(Cct::PassThrough, Flow::In).sum, 8000.00));
        assert!(close(day.bucket(Cct::PassThrough, Flow::Out).sum, 1200.00));
        assert!(close(day.bucket(Cct::Artificial, Flow::Out).sum, 2500.00));
        assert!(close(day.bucket(Cct::Unknown, Flow::In).sum, 950.00));

        assert!(close(day.free_cash_net, 68130.25));
        assert_eq!(day.unique_payers_count, 61);
        assert_eq!(day.accepted_partial_rows, 3);
        assert_eq!(day.unknown_cct_count, 4);

        let total_in = 68450.25 + 8000.00 + 950.00;
        let total_out = 320.00 + 42150.00 + 1200.00 + 2500.00;
        let total_flow = total_in + total_out;
        assert!((day.pass_through_ratio - (8000.00 + 1200.00) / total_flow).abs() < 1e-6);
        assert!((day.unknown_flow_ratio - 950.00 / total_flow).abs() < 1e-6);
        assert!((day.owner_dependency_ratio - 0.0).abs() < 1e-9);

        // Every accepted row lands in exactly one bucket
        assert_eq!(day.rows_accepted(), total_rows);
    }

    #[test]
    fn test_records_group_by_their_own_day() {
        let events = vec![
            evt("2025-01-01T10:00:00+00:00", 100.0, Direction::Credit, Channel::Upi, None, None, None, false),
            evt("2025-01-01T12:00:00+00:00", 50.0, Direction::Debit, Channel::Bank, None, None, None, false),
            evt("2025-01-02T09:00:00+00:00", 20.0, Direction::Credit, Channel::Upi, None, None, None, false),
        ];
        let aggs = aggregate_daily("s1", &classify_all(events));
        assert_eq!(aggs.len(), 2);
        assert_eq!(aggs[0].inflow_sum, 100.0);
        assert_eq!(aggs[0].outflow_sum, 50.0);
        assert_eq!(aggs[1].inflow_sum, 20.0);
        assert_eq!(aggs[1].outflow_sum, 0.0);
    }

    #[test]
    fn test_ratios_bounded() {
        let events = vec![
            evt(DAY, 10.0, Direction::Credit, Channel::Bank, None, None, None, false),
            evt(DAY, 90.0, Direction::Debit, Channel::Bank, None, Some("owner"), None, false),
        ];
        let aggs = aggregate_daily("s1", &classify_all(events));
        let day = &aggs[0];
        for ratio in [
            day.owner_dependency_ratio,
            day.pass_through_ratio,
            day.unknown_flow_ratio,
        ] {
            assert!((0.0..=1.0).contains(&ratio), "{ratio}");
        }
    }

    #[test]
    fn test_partitioned_combine_matches_sequential() {
        let events: Vec<CanonicalRecord> = (0..10)
            .map(|i| {
                evt(
                    DAY,
                    10.0 + i as f64,
                    if i % 2 == 0 { Direction::Credit } else { Direction::Debit },
                    Channel::Upi,
                    Some("sale"),
                    None,
                    Some(&format!("p{}", i % 3)),
                    false,
                )
            })
            .collect();
        let classified = classify_all(events);

        let mut sequential = DayAccumulator::default();
        for (record, cct) in &classified {
            sequential.observe(record, cct);
        }

        let (left, right) = classified.split_at(4);
        let mut a = DayAccumulator::default();
        for (record, cct) in left {
            a.observe(record, cct);
        }
        let mut b = DayAccumulator::default();
        for (record, cct) in right {
            b.observe(record, cct);
        }
        a.combine(b);

        let date = classified[0].0.day();
        let seq = sequential.finish("s1", date);
        let par = a.finish("s1", date);
        assert_eq!(seq.buckets, par.buckets);
        assert_eq!(seq.unique_payers_count, par.unique_payers_count);
        assert_eq!(seq.inflow_sum, par.inflow_sum);
        assert_eq!(seq.outflow_sum, par.outflow_sum);
    }

    #[test]
    fn test_payer_cardinality_counts_tokens_not_rows() {
        let events = vec![
            evt(DAY, 10.0, Direction::Credit, Channel::Upi, None, None, Some("p1"), false),
            evt(DAY, 20.0, Direction::Credit, Channel::Upi, None, None, Some("p1"), false),
            evt(DAY, 30.0, Direction::Credit, Channel::Upi, None, None, Some("p2"), false),
            evt(DAY, 40.0, Direction::Credit, Channel::Upi, None, None, None, false),
        ];
        let aggs = aggregate_daily("s1", &classify_all(events));
        assert_eq!(aggs[0].unique_payers_count, 2);
    }
}
