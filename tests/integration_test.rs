//! End-to-end study tests.
//!
//! Tests cover:
//! - Iron condor resolved and valued to expiry under both pricing regimes
//! - The same study over a CSV file with duplicate rows, and over SQLite
//! - Losing entries, weekday filtering and leg alignment
//! - Exit quote caching across entries sharing contracts
//! - In-memory dedup rewrite over monthly partitions

mod common;

use approx::assert_relative_eq;
use common::*;
use optstudy::adapters::csv_adapter::{read_quotes, write_quotes, CsvQuoteAdapter, MemoryQuoteStore};
use optstudy::domain::dedup::{dedup_quotes, month_partitions, rewrite_months, RewriteOutcome};
use optstudy::domain::error::OptstudyError;
use optstudy::domain::leg_resolver::{Guardrails, SelectionMode};
use optstudy::domain::margin::StrategyShape;
use optstudy::domain::quote::{DateRange, OptionType};
use optstudy::domain::strategy::Strategy;
use optstudy::domain::strategy_resolver::{resolve_strategy, ResolveRequest, WeekdayFilter};
use optstudy::domain::study::{run_study, StudyConfig, StudyResult};
use optstudy::domain::valuation::{value_to_maturity, ExitPolicy, PricingRegime};
use optstudy::ports::quote_port::QuoteSource;

fn january() -> DateRange {
    DateRange::new(date(2024, 1, 1), date(2024, 1, 31))
}

fn condor_study(tickers: &[&str]) -> StudyConfig {
    StudyConfig {
        description: "condor".into(),
        tickers: tickers.iter().map(|t| t.to_string()).collect(),
        range: january(),
        mode: SelectionMode::Nearest,
        require_all_legs: true,
        weekdays: None,
        guardrails: Guardrails::default(),
        exit_policy: ExitPolicy::HoldToMaturity,
        strategy: Strategy::iron_condor(25.0, 10.0, 30).unwrap(),
    }
}

fn assert_condor_result(result: &StudyResult) {
    assert_eq!(result.studies.len(), 1);
    let spy = &result.studies[0];
    assert_eq!(spy.entries.len(), 8);

    // Mid: credit (2.1 + 2.6 - 0.6 - 0.9) * 100 = 320, capital 1000 - 320.
    assert_eq!(spy.mid.outcomes.len(), 2);
    for o in &spy.mid.outcomes {
        assert_eq!(o.shape, StrategyShape::IronCondor);
        assert_eq!(o.legs, 4);
        assert_relative_eq!(o.net_entry_premium, -320.0, epsilon = 1e-9);
        assert_relative_eq!(o.portfolio_pnl, 320.0, epsilon = 1e-9);
        assert_relative_eq!(o.capital.unwrap(), 680.0, epsilon = 1e-9);
        assert_relative_eq!(o.roc.unwrap(), 320.0 / 680.0, epsilon = 1e-12);
        assert_relative_eq!(o.return_on_credit.unwrap(), 1.0, epsilon = 1e-12);
        assert_eq!(o.short_call_delta, Some(0.25));
        assert_eq!(o.short_put_delta, Some(-0.25));
    }

    // Worst: sell at bid, buy at ask -> credit 280, capital 720.
    for o in &spy.worst.outcomes {
        assert_relative_eq!(o.portfolio_pnl, 280.0, epsilon = 1e-9);
        assert_relative_eq!(o.capital.unwrap(), 720.0, epsilon = 1e-9);
    }

    let mid = &spy.mid.summary;
    assert_eq!(mid.entries, 2);
    assert_eq!(mid.wins, 2);
    assert_relative_eq!(mid.total_pnl, 640.0, epsilon = 1e-9);
    assert_relative_eq!(mid.roc.unwrap(), 640.0 / 1360.0, epsilon = 1e-12);
    assert_relative_eq!(mid.win_rate.unwrap(), 1.0);
    assert_eq!(result.overall[0].ticker, "ALL");
    assert_relative_eq!(result.overall[1].total_pnl, 560.0, epsilon = 1e-9);
}

mod study_pipeline {
    use super::*;

    #[test]
    fn condor_expiring_worthless() {
        let source = MockQuoteSource::new(condor_market());
        let result = run_study(&source, &condor_study(&["SPY"])).unwrap();
        assert_condor_result(&result);
    }

    #[test]
    fn short_call_finishing_in_the_money() {
        let mut quotes = condor_chain("SPY", date(2024, 1, 2));
        quotes.extend(condor_settlement("SPY", 5.0));
        let source = MockQuoteSource::new(quotes);

        let result = run_study(&source, &condor_study(&["SPY"])).unwrap();
        let outcome = &result.studies[0].mid.outcomes[0];
        assert_relative_eq!(outcome.portfolio_pnl, 320.0 - 500.0, epsilon = 1e-9);
        assert!(!outcome.is_win());
        assert_relative_eq!(result.studies[0].mid.summary.max_drawdown, 180.0, epsilon = 1e-9);
    }

    #[test]
    fn tickers_are_studied_independently() {
        let mut quotes = condor_market();
        quotes.extend(condor_chain("QQQ", date(2024, 1, 2)));
        quotes.extend(condor_settlement("QQQ", 0.0));
        let source = MockQuoteSource::new(quotes);

        let result = run_study(&source, &condor_study(&["SPY", "QQQ", "IWM"])).unwrap();
        let studied: Vec<&str> = result.studies.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(studied, vec!["SPY", "QQQ"]);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].ticker, "IWM");
        assert_eq!(result.overall[0].entries, 3);
        assert_relative_eq!(result.overall[0].total_pnl, 960.0, epsilon = 1e-9);
    }

    #[test]
    fn empty_universe_is_no_data() {
        let source = MockQuoteSource::new(condor_market());
        let err = run_study(&source, &condor_study(&["IWM"])).unwrap_err();
        assert!(matches!(err, OptstudyError::NoData { .. }));
    }

    #[test]
    fn weekday_filter_limits_entries() {
        let source = MockQuoteSource::new(condor_market());
        let mut study = condor_study(&["SPY"]);
        study.weekdays = Some(WeekdayFilter::parse("TUE").unwrap());

        let result = run_study(&source, &study).unwrap();
        let outcomes = &result.studies[0].mid.outcomes;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].entry_date, date(2024, 1, 2));
    }

    #[test]
    fn missing_legs_drop_the_day() {
        let mut quotes = condor_market();
        quotes.retain(|q| !(q.trade_date == date(2024, 1, 3) && q.option_type == OptionType::Put));
        let source = MockQuoteSource::new(quotes);

        let mut request =
            ResolveRequest::new("SPY", Strategy::iron_condor(25.0, 10.0, 30).unwrap(), january());
        let aligned = resolve_strategy(&source, &request).unwrap();
        assert!(aligned.iter().all(|e| e.entry_date == date(2024, 1, 2)));
        assert_eq!(aligned.len(), 4);

        request.require_all_legs = false;
        let partial = resolve_strategy(&source, &request).unwrap();
        assert_eq!(partial.len(), 6);
    }

    #[test]
    fn exit_quotes_are_fetched_once_per_contract() {
        let source = MockQuoteSource::new(condor_market());
        let request =
            ResolveRequest::new("SPY", Strategy::iron_condor(25.0, 10.0, 30).unwrap(), january());
        let entries = resolve_strategy(&source, &request).unwrap();
        assert_eq!(source.lookups(), 0);

        let valuation = value_to_maturity(&source, &entries, PricingRegime::Mid).unwrap();
        assert_eq!(valuation.outcomes.len(), 2);
        assert_eq!(source.lookups(), 4);
    }
}

mod adapters {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn csv_with_duplicate_rows_matches_clean_data() {
        let mut quotes = condor_market();
        let mut noisy = quotes[0].clone();
        noisy.open_interest = Some(1);
        noisy.bid = Some(0.01);
        quotes.push(noisy);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quotes.csv");
        write_quotes(&path, &quotes).unwrap();
        assert_eq!(read_quotes(&path).unwrap().len(), quotes.len());

        let source = CsvQuoteAdapter::from_path(&path).unwrap();
        assert_eq!(source.len(), condor_market().len());
        let result = run_study(&source, &condor_study(&["SPY"])).unwrap();
        assert_condor_result(&result);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_source_matches_memory_source() {
        use optstudy::adapters::sqlite_adapter::SqliteAdapter;

        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        let mut quotes = condor_market();
        quotes.extend(condor_market());
        adapter.insert_quotes(&quotes).unwrap();

        let from_sqlite = run_study(&adapter, &condor_study(&["SPY"])).unwrap();
        assert_condor_result(&from_sqlite);

        let memory = MockQuoteSource::new(condor_market());
        let from_memory = run_study(&memory, &condor_study(&["SPY"])).unwrap();
        assert_eq!(
            from_sqlite.studies[0].mid.outcomes,
            from_memory.studies[0].mid.outcomes
        );
    }

    #[test]
    fn sources_agree_on_point_lookups() {
        let csv = CsvQuoteAdapter::from_quotes(condor_market());
        let mock = MockQuoteSource::new(condor_market());
        for source in [&csv as &dyn QuoteSource, &mock] {
            let q = source
                .fetch_quote_on("SPY", OptionType::Put, 440.0, expiry(), date(2024, 1, 3))
                .unwrap()
                .unwrap();
            assert_eq!(q.bid, Some(2.5));
        }
    }
}

mod dedup_rewrite {
    use super::*;

    #[test]
    fn monthly_rewrite_matches_in_memory_dedup() {
        let mut rows = condor_market();
        rows.extend(condor_chain("SPY", date(2024, 1, 2)));
        let mut expected = dedup_quotes(rows.clone());
        let mut store = MemoryQuoteStore::new(rows);

        let months = month_partitions(&DateRange::new(date(2024, 1, 1), date(2024, 2, 29)));
        assert_eq!(months.len(), 2);

        let reports = rewrite_months(&mut store, &months, false).unwrap();
        assert_eq!(reports[0].outcome, RewriteOutcome::Rewritten { rows_after: 8 });
        assert_eq!(reports[0].rows_removed(), 4);
        assert_eq!(reports[1].outcome, RewriteOutcome::NoDuplicates);

        let mut after = dedup_quotes(store.into_rows());
        after.sort_by_key(|q| q.key());
        expected.sort_by_key(|q| q.key());
        assert_eq!(after, expected);
    }

    #[test]
    fn second_pass_finds_nothing() {
        let mut rows = condor_market();
        rows.extend(condor_market());
        let mut store = MemoryQuoteStore::new(rows);
        let months = month_partitions(&january());

        rewrite_months(&mut store, &months, false).unwrap();
        let again = rewrite_months(&mut store, &months, false).unwrap();
        assert!(again.iter().all(|r| r.outcome == RewriteOutcome::NoDuplicates));
    }
}
