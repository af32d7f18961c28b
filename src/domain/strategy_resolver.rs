//! Strategy resolution: every leg of a strategy resolved per entry date,
//! filtered by weekday and aligned across legs.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate, Weekday};
use tracing::{debug, info};

use crate::domain::error::OptstudyError;
use crate::domain::leg::Direction;
use crate::domain::leg_resolver::{resolve_leg, Guardrails, ResolvedLeg, SelectionMode};
use crate::domain::quote::{DateRange, OptionType};
use crate::domain::strategy::Strategy;
use crate::ports::quote_port::QuoteSource;

/// One leg of one entry, flattened for valuation and reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntry {
    pub ticker: String,
    pub entry_date: NaiveDate,
    pub leg_index: usize,
    pub direction: Direction,
    pub option_type: OptionType,
    pub quantity: u32,
    pub strike: f64,
    pub expiry: NaiveDate,
    /// Midpoint at entry.
    pub entry_price: f64,
    pub entry_bid: f64,
    pub entry_ask: f64,
    pub entry_delta: f64,
    /// Target delta magnitude in [0, 1].
    pub target_delta: f64,
    pub target_dte: u32,
}

impl ResolvedEntry {
    fn from_resolved(ticker: &str, leg_index: usize, resolved: &ResolvedLeg) -> Self {
        let leg = &resolved.leg;
        Self {
            ticker: ticker.to_string(),
            entry_date: resolved.entry_date,
            leg_index,
            direction: leg.direction(),
            option_type: leg.option_type(),
            quantity: leg.quantity(),
            strike: resolved.strike(),
            expiry: resolved.expiry(),
            entry_price: resolved.entry_price(),
            entry_bid: resolved.bid,
            entry_ask: resolved.ask,
            entry_delta: resolved.delta,
            target_delta: leg.strike_delta() / 100.0,
            target_dte: leg.dte(),
        }
    }

    pub fn is_short(&self) -> bool {
        self.direction == Direction::Sell
    }

    pub fn is_long(&self) -> bool {
        self.direction == Direction::Buy
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WeekdayError {
    #[error("empty token in weekday list")]
    EmptyToken,

    #[error("unknown weekday '{0}' (expected 0-6 or MON..SUN)")]
    Unknown(String),
}

/// Allowed entry weekdays, Monday = 0 through Sunday = 6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekdayFilter {
    days: BTreeSet<u32>,
}

impl WeekdayFilter {
    /// Integers are taken modulo 7, so 7 is Monday and -1 is Sunday.
    pub fn from_indices(indices: &[i64]) -> Self {
        Self {
            days: indices.iter().map(|i| i.rem_euclid(7) as u32).collect(),
        }
    }

    /// Parses a comma-separated list such as `"WED,FRI"` or `"2,4"`.
    pub fn parse(input: &str) -> Result<Self, WeekdayError> {
        let mut days = BTreeSet::new();
        for token in input.split(',') {
            let token = token.trim();
            if token.is_empty() {
                return Err(WeekdayError::EmptyToken);
            }
            let day = match token.parse::<i64>() {
                Ok(n) => n.rem_euclid(7) as u32,
                Err(_) => weekday_alias(token)
                    .ok_or_else(|| WeekdayError::Unknown(token.to_string()))?,
            };
            days.insert(day);
        }
        Ok(Self { days })
    }

    pub fn allows(&self, date: NaiveDate) -> bool {
        self.days.contains(&date.weekday().num_days_from_monday())
    }

    pub fn weekdays(&self) -> Vec<Weekday> {
        self.days.iter().map(|&d| WEEK[d as usize]).collect()
    }
}

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Matches on the first three letters, so "Wednesday" reads as WED.
fn weekday_alias(token: &str) -> Option<u32> {
    let upper = token.to_uppercase();
    let day = match upper.get(..3)? {
        "MON" => Weekday::Mon,
        "TUE" => Weekday::Tue,
        "WED" => Weekday::Wed,
        "THU" => Weekday::Thu,
        "FRI" => Weekday::Fri,
        "SAT" => Weekday::Sat,
        "SUN" => Weekday::Sun,
        _ => return None,
    };
    Some(day.num_days_from_monday())
}

#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub ticker: String,
    pub strategy: Strategy,
    pub range: DateRange,
    pub mode: SelectionMode,
    pub require_all_legs: bool,
    pub weekdays: Option<WeekdayFilter>,
    pub guardrails: Guardrails,
}

impl ResolveRequest {
    pub fn new(ticker: impl Into<String>, strategy: Strategy, range: DateRange) -> Self {
        Self {
            ticker: ticker.into(),
            strategy,
            range,
            mode: SelectionMode::default(),
            require_all_legs: true,
            weekdays: None,
            guardrails: Guardrails::default(),
        }
    }
}

/// Resolves every leg of the strategy and returns one row per (date, leg),
/// sorted by entry date, leg index, expiry, strike.
///
/// With `require_all_legs`, dates on which any leg failed to resolve are
/// dropped entirely.
pub fn resolve_strategy(
    source: &dyn QuoteSource,
    request: &ResolveRequest,
) -> Result<Vec<ResolvedEntry>, OptstudyError> {
    let mut entries = Vec::new();
    for (leg_index, leg) in request.strategy.legs.iter().enumerate() {
        let resolved = resolve_leg(
            source,
            &request.ticker,
            leg,
            &request.range,
            request.mode,
            &request.guardrails,
        )?;
        entries.extend(
            resolved
                .iter()
                .map(|r| ResolvedEntry::from_resolved(&request.ticker, leg_index, r)),
        );
    }

    if let Some(filter) = &request.weekdays {
        entries.retain(|e| filter.allows(e.entry_date));
    }

    let leg_count = request.strategy.legs.len();
    if request.require_all_legs && leg_count > 0 {
        let mut legs_by_date: BTreeMap<NaiveDate, BTreeSet<usize>> = BTreeMap::new();
        for e in &entries {
            legs_by_date.entry(e.entry_date).or_default().insert(e.leg_index);
        }
        let before = legs_by_date.len();
        let complete: BTreeSet<NaiveDate> = legs_by_date
            .into_iter()
            .filter(|(_, legs)| legs.len() == leg_count)
            .map(|(date, _)| date)
            .collect();
        debug!(
            ticker = %request.ticker,
            dropped = before - complete.len(),
            "dates without every leg dropped"
        );
        entries.retain(|e| complete.contains(&e.entry_date));
    }

    entries.sort_by(|a, b| {
        a.entry_date
            .cmp(&b.entry_date)
            .then(a.leg_index.cmp(&b.leg_index))
            .then(a.expiry.cmp(&b.expiry))
            .then(a.strike.total_cmp(&b.strike))
    });

    info!(
        ticker = %request.ticker,
        strategy = %request.strategy.name,
        rows = entries.len(),
        "strategy resolved"
    );
    Ok(entries)
}
