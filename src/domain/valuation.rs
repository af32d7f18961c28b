//! Valuation of resolved entries: per-leg P&L, grouping, shape and capital.
//!
//! Entries are grouped per (ticker, entry_date, expiry) when holding to
//! maturity, or per (ticker, entry_date) when exiting on the earliest leg
//! expiry. A group is valued only if every leg has a quote on the exit date
//! and its net entry premium is finite and not ~zero.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::domain::error::OptstudyError;
use crate::domain::leg::Direction;
use crate::domain::margin::{MarginLeg, StrategyShape};
use crate::domain::metrics::StudySummary;
use crate::domain::quote::{OptionType, CONTRACT_MULTIPLIER};
use crate::domain::strategy_resolver::ResolvedEntry;
use crate::ports::quote_port::QuoteSource;

/// Net premiums at or below this magnitude are treated as zero.
pub const PREMIUM_EPSILON: f64 = 1e-9;

/// How entry premiums are priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PricingRegime {
    /// Every leg at the bid/ask midpoint.
    Mid,
    /// Sold legs at the bid, bought legs at the ask.
    Worst,
}

impl PricingRegime {
    pub fn entry_price(&self, entry: &ResolvedEntry) -> f64 {
        match (self, entry.direction) {
            (PricingRegime::Mid, _) => entry.entry_price,
            (PricingRegime::Worst, Direction::Sell) => entry.entry_bid,
            (PricingRegime::Worst, Direction::Buy) => entry.entry_ask,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PricingRegime::Mid => "mid",
            PricingRegime::Worst => "worst",
        }
    }
}

impl std::fmt::Display for PricingRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitPolicy {
    /// Each leg is priced on its own expiry date.
    #[default]
    HoldToMaturity,
    /// All legs of an entry date exit on the earliest leg expiry.
    EarliestExpiry,
}

impl std::str::FromStr for ExitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "expiry" | "hold" | "hold_to_maturity" => Ok(ExitPolicy::HoldToMaturity),
            "earliest_expiry" | "earliest" => Ok(ExitPolicy::EarliestExpiry),
            other => Err(format!(
                "unknown exit policy '{other}' (expected expiry or earliest_expiry)"
            )),
        }
    }
}

/// Result of holding one group of legs from entry to exit.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioOutcome {
    pub ticker: String,
    pub entry_date: NaiveDate,
    pub expiry: NaiveDate,
    pub regime: PricingRegime,
    pub shape: StrategyShape,
    pub legs: usize,
    pub total_contracts: u32,
    /// Signed dollars; negative is a credit received.
    pub net_entry_premium: f64,
    pub portfolio_pnl: f64,
    pub capital: Option<f64>,
    pub roc: Option<f64>,
    pub return_on_credit: Option<f64>,
    pub short_call_delta: Option<f64>,
    pub short_put_delta: Option<f64>,
}

impl PortfolioOutcome {
    pub fn is_credit(&self) -> bool {
        self.net_entry_premium < 0.0
    }

    pub fn is_win(&self) -> bool {
        self.portfolio_pnl > 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Valuation {
    pub summary: StudySummary,
    pub outcomes: Vec<PortfolioOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ContractKey {
    ticker: String,
    option_type: OptionType,
    strike_bits: u64,
    expiry: NaiveDate,
    on: NaiveDate,
}

/// Fetches each contract's exit quote at most once.
struct ExitQuotes<'a> {
    source: &'a dyn QuoteSource,
    cache: HashMap<ContractKey, Option<f64>>,
}

impl<'a> ExitQuotes<'a> {
    fn new(source: &'a dyn QuoteSource) -> Self {
        Self {
            source,
            cache: HashMap::new(),
        }
    }

    fn price(
        &mut self,
        entry: &ResolvedEntry,
        on: NaiveDate,
    ) -> Result<Option<f64>, OptstudyError> {
        let key = ContractKey {
            ticker: entry.ticker.clone(),
            option_type: entry.option_type,
            strike_bits: entry.strike.to_bits(),
            expiry: entry.expiry,
            on,
        };
        if let Some(price) = self.cache.get(&key) {
            return Ok(*price);
        }
        let quote = if on == entry.expiry {
            self.source
                .fetch_expiry_quote(&entry.ticker, entry.option_type, entry.strike, entry.expiry)?
        } else {
            self.source.fetch_quote_on(
                &entry.ticker,
                entry.option_type,
                entry.strike,
                entry.expiry,
                on,
            )?
        };
        let price = quote
            .and_then(|q| q.settlement_price())
            .filter(|p| p.is_finite());
        self.cache.insert(key, price);
        Ok(price)
    }
}

type GroupKey = (String, NaiveDate, NaiveDate);

fn group_entries<'e>(
    entries: &'e [ResolvedEntry],
    policy: ExitPolicy,
) -> BTreeMap<GroupKey, Vec<&'e ResolvedEntry>> {
    let mut groups: BTreeMap<GroupKey, Vec<&ResolvedEntry>> = BTreeMap::new();
    match policy {
        ExitPolicy::HoldToMaturity => {
            for e in entries {
                groups
                    .entry((e.ticker.clone(), e.entry_date, e.expiry))
                    .or_default()
                    .push(e);
            }
        }
        ExitPolicy::EarliestExpiry => {
            let mut by_date: BTreeMap<(String, NaiveDate), Vec<&ResolvedEntry>> = BTreeMap::new();
            for e in entries {
                by_date
                    .entry((e.ticker.clone(), e.entry_date))
                    .or_default()
                    .push(e);
            }
            for ((ticker, entry_date), legs) in by_date {
                if let Some(exit) = legs.iter().map(|e| e.expiry).min() {
                    groups.insert((ticker, entry_date, exit), legs);
                }
            }
        }
    }
    groups
}

fn value_group(
    quotes: &mut ExitQuotes<'_>,
    key: &GroupKey,
    legs: &[&ResolvedEntry],
    regime: PricingRegime,
) -> Result<Option<PortfolioOutcome>, OptstudyError> {
    let (ticker, entry_date, exit_date) = key;

    let mut pnl = 0.0;
    let mut premium = 0.0;
    let mut margin_legs = Vec::with_capacity(legs.len());
    for leg in legs {
        let Some(exit_price) = quotes.price(leg, *exit_date)? else {
            debug!(
                %ticker,
                %entry_date,
                strike = leg.strike,
                expiry = %leg.expiry,
                "no exit quote; group dropped"
            );
            return Ok(None);
        };
        let entry_price = regime.entry_price(leg);
        let sign = leg.direction.sign();
        let qty = f64::from(leg.quantity);
        pnl += (exit_price - entry_price) * CONTRACT_MULTIPLIER * sign * qty;
        premium += entry_price * CONTRACT_MULTIPLIER * qty * sign;
        margin_legs.push(MarginLeg {
            direction: leg.direction,
            option_type: leg.option_type,
            strike: leg.strike,
            quantity: leg.quantity,
            premium: entry_price,
        });
    }

    if !premium.is_finite() || premium.abs() <= PREMIUM_EPSILON || !pnl.is_finite() {
        debug!(%ticker, %entry_date, premium, "zero or non-finite premium; group dropped");
        return Ok(None);
    }

    let shape = StrategyShape::classify(&margin_legs);
    let capital = shape.capital(&margin_legs, premium);
    let roc = capital
        .filter(|c| *c > PREMIUM_EPSILON)
        .map(|c| pnl / c)
        .filter(|r| r.is_finite());
    let return_on_credit = (premium < 0.0)
        .then(|| pnl / -premium)
        .filter(|r| r.is_finite());

    let short_delta = |option_type: OptionType| {
        legs.iter()
            .find(|l| l.is_short() && l.option_type == option_type)
            .map(|l| l.entry_delta)
    };

    let mut leg_indices: Vec<usize> = legs.iter().map(|l| l.leg_index).collect();
    leg_indices.sort_unstable();
    leg_indices.dedup();

    Ok(Some(PortfolioOutcome {
        ticker: ticker.clone(),
        entry_date: *entry_date,
        expiry: *exit_date,
        regime,
        shape,
        legs: leg_indices.len(),
        total_contracts: legs.iter().map(|l| l.quantity).sum(),
        net_entry_premium: premium,
        portfolio_pnl: pnl,
        capital,
        roc,
        return_on_credit,
        short_call_delta: short_delta(OptionType::Call),
        short_put_delta: short_delta(OptionType::Put),
    }))
}

/// Values resolved entries under one pricing regime and exit policy.
pub fn value_entries(
    source: &dyn QuoteSource,
    entries: &[ResolvedEntry],
    regime: PricingRegime,
    policy: ExitPolicy,
) -> Result<Valuation, OptstudyError> {
    let groups = group_entries(entries, policy);
    let mut quotes = ExitQuotes::new(source);
    let mut outcomes = Vec::with_capacity(groups.len());
    for (key, legs) in &groups {
        if let Some(outcome) = value_group(&mut quotes, key, legs, regime)? {
            outcomes.push(outcome);
        }
    }

    let label = summary_label(entries);
    info!(
        ticker = %label,
        %regime,
        groups = groups.len(),
        valued = outcomes.len(),
        "entries valued"
    );
    Ok(Valuation {
        summary: StudySummary::compute(&label, regime, &outcomes),
        outcomes,
    })
}

/// Holds every leg to its own expiry.
pub fn value_to_maturity(
    source: &dyn QuoteSource,
    entries: &[ResolvedEntry],
    regime: PricingRegime,
) -> Result<Valuation, OptstudyError> {
    value_entries(source, entries, regime, ExitPolicy::HoldToMaturity)
}

fn summary_label(entries: &[ResolvedEntry]) -> String {
    match entries.first() {
        Some(first) if entries.iter().all(|e| e.ticker == first.ticker) => first.ticker.clone(),
        Some(_) => "ALL".to_string(),
        None => String::new(),
    }
}
