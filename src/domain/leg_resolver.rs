//! Leg resolution: matching a trader-language leg to one concrete contract
//! per trading day.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use tracing::debug;

use crate::domain::error::OptstudyError;
use crate::domain::leg::{Leg, Resolution};
use crate::domain::quote::{DateRange, Quote};
use crate::ports::quote_port::{ExpiryConstraint, QuoteQuery, QuoteSource};

/// How the target DTE constrains the expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// expiry == entry_date + dte; rank by delta distance, then strike.
    Exact,
    /// expiry >= entry_date + dte; rank by earliest expiry, delta distance, strike.
    NextOnOrAfter,
    /// rank by DTE distance, delta distance, strike.
    #[default]
    Nearest,
}

impl SelectionMode {
    pub fn expiry_constraint(&self, dte: i64) -> ExpiryConstraint {
        match self {
            SelectionMode::Exact => ExpiryConstraint::ExactDte(dte),
            SelectionMode::NextOnOrAfter => ExpiryConstraint::MinDte(dte),
            SelectionMode::Nearest => ExpiryConstraint::Any,
        }
    }
}

impl FromStr for SelectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exact" => Ok(SelectionMode::Exact),
            "next_on_or_after" | "next" => Ok(SelectionMode::NextOnOrAfter),
            "nearest" => Ok(SelectionMode::Nearest),
            other => Err(format!(
                "unknown selection mode '{other}' (expected exact, next_on_or_after, nearest)"
            )),
        }
    }
}

/// Tolerances on the winning candidate. A day whose best match falls
/// outside them resolves to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Guardrails {
    /// Max |delta - target| in delta units (0.05 = 5 delta).
    pub max_delta_error: Option<f64>,
    /// Max |actual_dte - target_dte| in days.
    pub max_dte_error: Option<i64>,
}

impl Guardrails {
    fn admits(&self, delta_error: f64, dte_error: i64) -> bool {
        self.max_delta_error.is_none_or(|max| delta_error <= max)
            && self.max_dte_error.is_none_or(|max| dte_error <= max)
    }
}

/// A leg matched to a contract on one entry date.
///
/// `leg` carries the same `resolution`; it is kept here unwrapped so callers
/// never see an unresolved leg.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLeg {
    pub entry_date: NaiveDate,
    pub leg: Leg,
    pub resolution: Resolution,
    pub delta: f64,
    pub bid: f64,
    pub ask: f64,
}

impl ResolvedLeg {
    pub fn strike(&self) -> f64 {
        self.resolution.strike
    }

    pub fn expiry(&self) -> NaiveDate {
        self.resolution.expiry
    }

    pub fn entry_price(&self) -> f64 {
        self.resolution.entry_price
    }
}

/// A quote with everything needed for ranking present.
struct Candidate<'a> {
    quote: &'a Quote,
    delta: f64,
    bid: f64,
    ask: f64,
    delta_error: f64,
    dte_error: i64,
}

impl<'a> Candidate<'a> {
    fn new(quote: &'a Quote, delta_target: f64, target_dte: i64) -> Option<Self> {
        let delta = quote.delta.filter(|d| d.is_finite())?;
        let bid = quote.bid.filter(|b| b.is_finite())?;
        let ask = quote.ask.filter(|a| a.is_finite())?;
        Some(Self {
            quote,
            delta,
            bid,
            ask,
            delta_error: (delta - delta_target).abs(),
            dte_error: (quote.dte() - target_dte).abs(),
        })
    }
}

fn rank(mode: SelectionMode, a: &Candidate, b: &Candidate) -> Ordering {
    let by_delta_then_strike = || {
        a.delta_error
            .total_cmp(&b.delta_error)
            .then(a.quote.strike.total_cmp(&b.quote.strike))
    };
    match mode {
        SelectionMode::Exact => by_delta_then_strike(),
        SelectionMode::NextOnOrAfter => a
            .quote
            .expiry
            .cmp(&b.quote.expiry)
            .then_with(by_delta_then_strike),
        SelectionMode::Nearest => a
            .dte_error
            .cmp(&b.dte_error)
            .then_with(by_delta_then_strike)
            .then(a.quote.expiry.cmp(&b.quote.expiry)),
    }
}

/// Picks the best contract for `leg` among one day's quotes.
///
/// Quotes of other types or outside the mode's expiry constraint are
/// ignored; quotes missing delta, bid or ask never compete.
pub fn select_contract(
    quotes: &[Quote],
    entry_date: NaiveDate,
    leg: &Leg,
    mode: SelectionMode,
    guardrails: &Guardrails,
) -> Option<ResolvedLeg> {
    let target_dte = leg.dte() as i64;
    let constraint = mode.expiry_constraint(target_dte);
    let delta_target = leg.delta_target();

    let best = quotes
        .iter()
        .filter(|q| q.trade_date == entry_date && q.option_type == leg.option_type())
        .filter(|q| constraint.accepts(q.trade_date, q.expiry))
        .filter_map(|q| Candidate::new(q, delta_target, target_dte))
        .min_by(|a, b| rank(mode, a, b))?;

    if !guardrails.admits(best.delta_error, best.dte_error) {
        debug!(
            %entry_date,
            strike = best.quote.strike,
            delta_error = best.delta_error,
            dte_error = best.dte_error,
            "best candidate outside guardrails"
        );
        return None;
    }

    let resolution = Resolution {
        strike: best.quote.strike,
        expiry: best.quote.expiry,
        entry_price: (best.bid + best.ask) / 2.0,
    };
    Some(ResolvedLeg {
        entry_date,
        leg: leg.with_resolution(resolution.strike, resolution.expiry, resolution.entry_price),
        resolution,
        delta: best.delta,
        bid: best.bid,
        ask: best.ask,
    })
}

/// Resolves `leg` on every trading day of `range` that has a match.
pub fn resolve_leg(
    source: &dyn QuoteSource,
    ticker: &str,
    leg: &Leg,
    range: &DateRange,
    mode: SelectionMode,
    guardrails: &Guardrails,
) -> Result<Vec<ResolvedLeg>, OptstudyError> {
    let query = QuoteQuery::for_ticker(ticker, leg.option_type(), *range)
        .with_expiry(mode.expiry_constraint(leg.dte() as i64));
    let quotes = source.fetch_quotes(&query)?;

    let mut by_day: BTreeMap<NaiveDate, Vec<Quote>> = BTreeMap::new();
    for quote in quotes {
        by_day.entry(quote.trade_date).or_default().push(quote);
    }

    let days = by_day.len();
    let resolved: Vec<ResolvedLeg> = by_day
        .iter()
        .filter_map(|(day, quotes)| select_contract(quotes, *day, leg, mode, guardrails))
        .collect();

    debug!(ticker, %leg, days, resolved = resolved.len(), "leg resolved");
    Ok(resolved)
}
