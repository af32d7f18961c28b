//! Multi-ticker study runner.
//!
//! Each ticker is resolved once and valued under both pricing regimes from
//! the same entries. Tickers are independent and run in parallel.

use rayon::prelude::*;
use tracing::{info, warn};

use crate::domain::error::OptstudyError;
use crate::domain::leg_resolver::{Guardrails, SelectionMode};
use crate::domain::metrics::StudySummary;
use crate::domain::quote::DateRange;
use crate::domain::strategy::Strategy;
use crate::domain::strategy_resolver::{
    resolve_strategy, ResolveRequest, ResolvedEntry, WeekdayFilter,
};
use crate::domain::universe::{SkipReason, SkippedTicker};
use crate::domain::valuation::{value_entries, ExitPolicy, PricingRegime, Valuation};
use crate::ports::quote_port::QuoteSource;

#[derive(Debug, Clone)]
pub struct StudyConfig {
    pub description: String,
    pub tickers: Vec<String>,
    pub range: DateRange,
    pub mode: SelectionMode,
    pub require_all_legs: bool,
    pub weekdays: Option<WeekdayFilter>,
    pub guardrails: Guardrails,
    pub exit_policy: ExitPolicy,
    pub strategy: Strategy,
}

impl StudyConfig {
    pub fn request_for(&self, ticker: &str) -> ResolveRequest {
        ResolveRequest {
            ticker: ticker.to_string(),
            strategy: self.strategy.clone(),
            range: self.range,
            mode: self.mode,
            require_all_legs: self.require_all_legs,
            weekdays: self.weekdays.clone(),
            guardrails: self.guardrails,
        }
    }
}

/// One ticker valued under both regimes.
#[derive(Debug, Clone)]
pub struct TickerStudy {
    pub ticker: String,
    pub entries: Vec<ResolvedEntry>,
    pub mid: Valuation,
    pub worst: Valuation,
}

impl TickerStudy {
    pub fn valuations(&self) -> [&Valuation; 2] {
        [&self.mid, &self.worst]
    }
}

#[derive(Debug, Clone)]
pub struct StudyResult {
    pub studies: Vec<TickerStudy>,
    pub skipped: Vec<SkippedTicker>,
    /// Pooled over every studied ticker, mid then worst.
    pub overall: [StudySummary; 2],
}

impl StudyResult {
    /// Per-ticker summaries followed by the pooled ones.
    pub fn summaries(&self) -> Vec<&StudySummary> {
        self.studies
            .iter()
            .flat_map(|s| [&s.mid.summary, &s.worst.summary])
            .chain(self.overall.iter())
            .collect()
    }
}

enum TickerOutcome {
    Studied(TickerStudy),
    Skipped(SkippedTicker),
}

pub fn study_ticker(
    source: &dyn QuoteSource,
    config: &StudyConfig,
    ticker: &str,
) -> Result<TickerStudy, OptstudyError> {
    let entries = resolve_strategy(source, &config.request_for(ticker))?;
    let mid = value_entries(source, &entries, PricingRegime::Mid, config.exit_policy)?;
    let worst = value_entries(source, &entries, PricingRegime::Worst, config.exit_policy)?;
    Ok(TickerStudy {
        ticker: ticker.to_string(),
        entries,
        mid,
        worst,
    })
}

fn classify(study: TickerStudy) -> TickerOutcome {
    let reason = if study.entries.is_empty() {
        Some(SkipReason::NoEntries)
    } else if study.mid.outcomes.is_empty() && study.worst.outcomes.is_empty() {
        Some(SkipReason::NoOutcomes)
    } else {
        None
    };
    match reason {
        Some(reason) => {
            warn!(ticker = %study.ticker, %reason, "skipping ticker");
            TickerOutcome::Skipped(SkippedTicker {
                ticker: study.ticker,
                reason,
            })
        }
        None => TickerOutcome::Studied(study),
    }
}

/// Runs the configured strategy over every ticker.
///
/// Fails with [`OptstudyError::NoData`] when no ticker produced an outcome.
pub fn run_study(
    source: &dyn QuoteSource,
    config: &StudyConfig,
) -> Result<StudyResult, OptstudyError> {
    info!(
        strategy = %config.strategy.name,
        tickers = config.tickers.len(),
        start = %config.range.start,
        end = %config.range.end,
        "study started"
    );

    let results: Vec<TickerOutcome> = config
        .tickers
        .par_iter()
        .map(|ticker| study_ticker(source, config, ticker).map(classify))
        .collect::<Result<_, _>>()?;

    let mut studies = Vec::new();
    let mut skipped = Vec::new();
    for result in results {
        match result {
            TickerOutcome::Studied(s) => studies.push(s),
            TickerOutcome::Skipped(s) => skipped.push(s),
        }
    }

    if studies.is_empty() {
        return Err(OptstudyError::NoData {
            ticker: config.tickers.join(","),
        });
    }

    let pooled = |regime: PricingRegime| {
        let outcomes: Vec<_> = studies
            .iter()
            .flat_map(|s| match regime {
                PricingRegime::Mid => &s.mid.outcomes,
                PricingRegime::Worst => &s.worst.outcomes,
            })
            .cloned()
            .collect();
        StudySummary::compute("ALL", regime, &outcomes)
    };
    let overall = [pooled(PricingRegime::Mid), pooled(PricingRegime::Worst)];

    info!(
        studied = studies.len(),
        skipped = skipped.len(),
        entries = overall[0].entries,
        "study finished"
    );
    Ok(StudyResult {
        studies,
        skipped,
        overall,
    })
}
