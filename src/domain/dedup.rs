//! Quote deduplication policy.
//!
//! Several vendors can report the same contract on the same day. The
//! canonical row per [`QuoteKey`] is the one with the highest open interest
//! (missing sorts last), then the highest bid (missing sorts last). Ask,
//! volume and last break any remaining tie, and after that input order wins,
//! so the choice is deterministic.
//!
//! The same ordering drives both call sites: [`dedup_quotes`] for in-memory
//! sources and [`CANONICAL_ORDER_SQL`] for SQL-backed ones.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use tracing::{info, warn};

use crate::domain::error::OptstudyError;
use crate::domain::quote::{DateRange, Quote, QuoteKey};
use crate::ports::quote_port::QuoteStore;

/// Window ordering equivalent to [`canonical_order`].
pub const CANONICAL_ORDER_SQL: &str = "open_interest DESC NULLS LAST, bid DESC NULLS LAST, \
     ask DESC NULLS LAST, volume DESC NULLS LAST, last DESC NULLS LAST";

/// Partition clause matching [`QuoteKey`].
pub const KEY_COLUMNS_SQL: &str = "ticker, trade_date, option_type, strike, expiry";

fn desc_nulls_last<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// `Less` means `a` is preferred over `b`.
pub fn canonical_order(a: &Quote, b: &Quote) -> Ordering {
    desc_nulls_last(a.open_interest, b.open_interest)
        .then_with(|| desc_nulls_last(a.bid, b.bid))
        .then_with(|| desc_nulls_last(a.ask, b.ask))
        .then_with(|| desc_nulls_last(a.volume, b.volume))
        .then_with(|| desc_nulls_last(a.last, b.last))
}

/// The canonical quote among rows sharing a key.
pub fn canonical(quotes: &[Quote]) -> Option<&Quote> {
    // min_by returns the first of equal elements, keeping input order as the last tie-break.
    quotes.iter().min_by(|a, b| canonical_order(a, b))
}

/// Collapses to one row per key, ordered by key.
pub fn dedup_quotes(quotes: Vec<Quote>) -> Vec<Quote> {
    let mut best: BTreeMap<QuoteKey, Quote> = BTreeMap::new();
    for quote in quotes {
        let key = quote.key();
        match best.get(&key) {
            Some(current) if canonical_order(&quote, current) != Ordering::Less => {}
            _ => {
                best.insert(key, quote);
            }
        }
    }
    best.into_values().collect()
}

/// Number of keys with more than one row.
pub fn count_duplicate_keys(quotes: &[Quote]) -> usize {
    let mut counts: BTreeMap<QuoteKey, usize> = BTreeMap::new();
    for quote in quotes {
        *counts.entry(quote.key()).or_default() += 1;
    }
    counts.values().filter(|&&n| n > 1).count()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    NoDuplicates,
    DryRun,
    Rewritten { rows_after: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteReport {
    pub partition: String,
    pub rows_before: usize,
    pub duplicate_keys: usize,
    pub outcome: RewriteOutcome,
}

impl RewriteReport {
    pub fn rows_removed(&self) -> usize {
        match self.outcome {
            RewriteOutcome::Rewritten { rows_after } => self.rows_before.saturating_sub(rows_after),
            _ => 0,
        }
    }
}

/// Destructively deduplicates one partition of a store.
///
/// Aborts with [`OptstudyError::DedupInvariant`] if staging yields zero rows
/// while duplicates were counted, or if the post-rewrite count differs from
/// the staged count. The staging area is discarded on every path.
pub fn rewrite_partition(
    store: &mut dyn QuoteStore,
    range: &DateRange,
    dry_run: bool,
) -> Result<RewriteReport, OptstudyError> {
    let partition = range.month_label();
    let rows_before = store.count_rows(range)?;
    let duplicate_keys = store.count_duplicate_keys(range)?;
    info!(%partition, rows_before, duplicate_keys, "dedup partition scanned");

    let report = |outcome| RewriteReport {
        partition: partition.clone(),
        rows_before,
        duplicate_keys,
        outcome,
    };

    if duplicate_keys == 0 {
        return Ok(report(RewriteOutcome::NoDuplicates));
    }
    if dry_run {
        return Ok(report(RewriteOutcome::DryRun));
    }

    let result = stage_and_replace(store, range, &partition);
    let cleanup = store.discard_staged();

    let rows_after = result?;
    if let Err(e) = cleanup {
        warn!(%partition, error = %e, "failed to discard dedup staging area");
    }
    info!(
        %partition,
        rows_after,
        removed = rows_before.saturating_sub(rows_after),
        "dedup partition rewritten"
    );
    Ok(report(RewriteOutcome::Rewritten { rows_after }))
}

fn stage_and_replace(
    store: &mut dyn QuoteStore,
    range: &DateRange,
    partition: &str,
) -> Result<usize, OptstudyError> {
    let staged = store.stage_deduplicated(range)?;
    if staged == 0 {
        return Err(OptstudyError::DedupInvariant {
            partition: partition.to_string(),
            reason: "staging produced 0 rows; aborting before delete".to_string(),
        });
    }

    store.replace_from_staged(range)?;

    let rows_after = store.count_rows(range)?;
    if rows_after != staged {
        return Err(OptstudyError::DedupInvariant {
            partition: partition.to_string(),
            reason: format!("expected {staged} rows after rewrite, found {rows_after}"),
        });
    }
    Ok(rows_after)
}

/// Rewrites partitions in order, halting at the first error.
pub fn rewrite_months(
    store: &mut dyn QuoteStore,
    months: &[DateRange],
    dry_run: bool,
) -> Result<Vec<RewriteReport>, OptstudyError> {
    let mut reports = Vec::with_capacity(months.len());
    for month in months {
        reports.push(rewrite_partition(store, month, dry_run)?);
    }
    Ok(reports)
}

/// Splits `range` into calendar-month partitions clipped to the range.
pub fn month_partitions(range: &DateRange) -> Vec<DateRange> {
    let mut partitions = Vec::new();
    let mut start = range.start;
    while start <= range.end {
        let next_month = first_of_next_month(start);
        let month_end = next_month
            .and_then(|d| d.pred_opt())
            .unwrap_or(range.end)
            .min(range.end);
        partitions.push(DateRange::new(start, month_end));
        match next_month {
            Some(d) => start = d,
            None => break,
        }
    }
    partitions
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::OptionType;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn quote(strike: f64, open_interest: Option<i64>, bid: Option<f64>) -> Quote {
        Quote {
            ticker: "SPY".into(),
            trade_date: date(2024, 1, 2),
            expiry: date(2024, 2, 16),
            option_type: OptionType::Call,
            strike,
            bid,
            ask: bid.map(|b| b + 0.1),
            last: None,
            bid_iv: None,
            ask_iv: None,
            open_interest,
            volume: None,
            delta: Some(0.3),
            gamma: None,
            theta: None,
            vega: None,
            rho: None,
        }
    }

    #[test]
    fn tie_break_on_bid_after_open_interest() {
        let rows = vec![
            quote(100.0, None, Some(9.0)),
            quote(100.0, Some(5), Some(1.0)),
            quote(100.0, Some(5), Some(2.0)),
            quote(100.0, Some(3), Some(9.0)),
        ];
        let best = canonical(&rows).unwrap();
        assert_eq!(best.open_interest, Some(5));
        assert_eq!(best.bid, Some(2.0));
    }

    #[test]
    fn missing_open_interest_ranks_lowest() {
        let rows = vec![quote(100.0, None, Some(50.0)), quote(100.0, Some(0), Some(0.1))];
        assert_eq!(canonical(&rows).unwrap().open_interest, Some(0));
    }

    #[test]
    fn missing_bid_ranks_below_any_bid() {
        let rows = vec![quote(100.0, Some(5), None), quote(100.0, Some(5), Some(0.0))];
        assert_eq!(canonical(&rows).unwrap().bid, Some(0.0));
    }

    #[test]
    fn identical_rank_keeps_first_seen() {
        let mut a = quote(100.0, Some(5), Some(1.0));
        a.delta = Some(0.31);
        let mut b = quote(100.0, Some(5), Some(1.0));
        b.delta = Some(0.29);
        assert_eq!(canonical(&[a.clone(), b.clone()]).unwrap().delta, Some(0.31));
        assert_eq!(dedup_quotes(vec![a, b])[0].delta, Some(0.31));
    }

    #[test]
    fn dedup_agrees_with_canonical() {
        let rows = vec![
            quote(100.0, None, Some(9.0)),
            quote(100.0, Some(5), Some(1.0)),
            quote(105.0, Some(1), Some(1.0)),
            quote(100.0, Some(5), Some(2.0)),
            quote(100.0, Some(3), Some(9.0)),
        ];
        let out = dedup_quotes(rows.clone());
        assert_eq!(out.len(), 2);
        let at_100: Vec<Quote> = rows.iter().filter(|q| q.strike == 100.0).cloned().collect();
        assert_eq!(&out[0], canonical(&at_100).unwrap());
        assert_eq!(out[1].strike, 105.0);
    }

    #[test]
    fn count_duplicate_keys_counts_keys_not_rows() {
        let rows = vec![
            quote(100.0, Some(1), Some(1.0)),
            quote(100.0, Some(2), Some(1.0)),
            quote(100.0, Some(3), Some(1.0)),
            quote(105.0, Some(1), Some(1.0)),
        ];
        assert_eq!(count_duplicate_keys(&rows), 1);
    }

    #[test]
    fn month_partitions_clip_to_range() {
        let parts = month_partitions(&DateRange::new(date(2025, 11, 15), date(2026, 2, 10)));
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], DateRange::new(date(2025, 11, 15), date(2025, 11, 30)));
        assert_eq!(parts[1], DateRange::new(date(2025, 12, 1), date(2025, 12, 31)));
        assert_eq!(parts[3], DateRange::new(date(2026, 2, 1), date(2026, 2, 10)));
    }

    /// Store whose staging and rewrite results are scripted per test.
    #[derive(Default)]
    struct FaultyStore {
        rows: usize,
        duplicate_keys: usize,
        staged: usize,
        rows_after: usize,
        stage_calls: usize,
        replaced: bool,
        discarded: usize,
        fail_discard: bool,
    }

    impl QuoteStore for FaultyStore {
        fn count_rows(&self, _range: &DateRange) -> Result<usize, OptstudyError> {
            Ok(if self.replaced { self.rows_after } else { self.rows })
        }

        fn count_duplicate_keys(&self, _range: &DateRange) -> Result<usize, OptstudyError> {
            Ok(self.duplicate_keys)
        }

        fn stage_deduplicated(&mut self, _range: &DateRange) -> Result<usize, OptstudyError> {
            self.stage_calls += 1;
            Ok(self.staged)
        }

        fn replace_from_staged(&mut self, _range: &DateRange) -> Result<(), OptstudyError> {
            self.replaced = true;
            Ok(())
        }

        fn discard_staged(&mut self) -> Result<(), OptstudyError> {
            self.discarded += 1;
            if self.fail_discard {
                return Err(OptstudyError::Database {
                    reason: "drop failed".into(),
                });
            }
            Ok(())
        }
    }

    fn two_months() -> Vec<DateRange> {
        month_partitions(&DateRange::new(date(2024, 1, 1), date(2024, 2, 29)))
    }

    #[test]
    fn empty_staging_aborts_before_replace() {
        let mut store = FaultyStore {
            rows: 10,
            duplicate_keys: 2,
            staged: 0,
            ..Default::default()
        };
        let err = rewrite_months(&mut store, &two_months(), false).unwrap_err();

        match err {
            OptstudyError::DedupInvariant { partition, reason } => {
                assert_eq!(partition, "2024-01");
                assert!(reason.contains("0 rows"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!store.replaced);
        assert_eq!(store.stage_calls, 1, "February must not be touched");
        assert_eq!(store.discarded, 1);
    }

    #[test]
    fn row_count_mismatch_after_rewrite_is_fatal() {
        let mut store = FaultyStore {
            rows: 10,
            duplicate_keys: 2,
            staged: 8,
            rows_after: 7,
            ..Default::default()
        };
        let err = rewrite_months(&mut store, &two_months(), false).unwrap_err();

        match err {
            OptstudyError::DedupInvariant { partition, reason } => {
                assert_eq!(partition, "2024-01");
                assert_eq!(reason, "expected 8 rows after rewrite, found 7");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.replaced);
        assert_eq!(store.stage_calls, 1);
        assert_eq!(store.discarded, 1);
    }

    #[test]
    fn staging_is_discarded_after_success_even_if_drop_fails() {
        let mut store = FaultyStore {
            rows: 10,
            duplicate_keys: 2,
            staged: 8,
            rows_after: 8,
            fail_discard: true,
            ..Default::default()
        };
        let january = DateRange::new(date(2024, 1, 1), date(2024, 1, 31));
        let report = rewrite_partition(&mut store, &january, false).unwrap();

        assert_eq!(report.outcome, RewriteOutcome::Rewritten { rows_after: 8 });
        assert_eq!(report.rows_removed(), 2);
        assert_eq!(store.discarded, 1);
    }

    #[test]
    fn dry_run_and_clean_partitions_never_stage() {
        let mut store = FaultyStore {
            rows: 10,
            duplicate_keys: 2,
            ..Default::default()
        };
        let reports = rewrite_months(&mut store, &two_months(), true).unwrap();
        assert!(reports.iter().all(|r| r.outcome == RewriteOutcome::DryRun));

        store.duplicate_keys = 0;
        let reports = rewrite_months(&mut store, &two_months(), false).unwrap();
        assert!(reports.iter().all(|r| r.outcome == RewriteOutcome::NoDuplicates));
        assert_eq!(store.stage_calls, 0);
        assert_eq!(store.discarded, 0);
    }

    fn arb_quote() -> impl Strategy<Value = Quote> {
        (
            0usize..3,
            prop::option::of(0i64..4),
            prop::option::of(0u8..4),
            prop::option::of(0u8..3),
        )
            .prop_map(|(strike_idx, oi, bid, ask)| {
                let mut q = quote(100.0 + 5.0 * strike_idx as f64, oi, bid.map(f64::from));
                q.ask = ask.map(f64::from);
                q
            })
    }

    proptest! {
        #[test]
        fn dedup_is_idempotent(rows in prop::collection::vec(arb_quote(), 0..40)) {
            let once = dedup_quotes(rows);
            let twice = dedup_quotes(once.clone());
            prop_assert_eq!(count_duplicate_keys(&once), 0);
            prop_assert_eq!(once, twice);
        }
    }
}
