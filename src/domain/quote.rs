//! Daily option quote representation.
//!
//! A [`Quote`] is one observation of one contract on one trade date, as
//! supplied by a quote source. Every market field except the contract key is
//! optional: vendors disagree on which columns they populate, and a missing
//! bid must never be read as a zero bid.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Shares per contract.
pub const CONTRACT_MULTIPLIER: f64 = 100.0;

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionType {
    #[serde(alias = "C", alias = "call", alias = "CALL")]
    Call,
    #[serde(alias = "P", alias = "put", alias = "PUT")]
    Put,
}

impl OptionType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "C" | "CALL" => Some(Self::Call),
            "P" | "PUT" => Some(Self::Put),
            _ => None,
        }
    }

    /// Single-letter code used in storage ("C" / "P").
    pub fn code(&self) -> &'static str {
        match self {
            Self::Call => "C",
            Self::Put => "P",
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "CALL"),
            Self::Put => write!(f, "PUT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: String,
    pub trade_date: NaiveDate,
    pub expiry: NaiveDate,
    pub option_type: OptionType,
    pub strike: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last: Option<f64>,
    pub bid_iv: Option<f64>,
    pub ask_iv: Option<f64>,
    pub open_interest: Option<i64>,
    pub volume: Option<i64>,
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub rho: Option<f64>,
}

impl Quote {
    pub fn key(&self) -> QuoteKey {
        QuoteKey {
            ticker: self.ticker.clone(),
            trade_date: self.trade_date,
            option_type: self.option_type,
            strike: self.strike,
            expiry: self.expiry,
        }
    }

    /// Calendar days from trade date to expiry.
    pub fn dte(&self) -> i64 {
        (self.expiry - self.trade_date).num_days()
    }

    /// (bid + ask) / 2, only when both sides are quoted.
    pub fn mid(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    /// Settlement price for valuation: last trade, else the midpoint.
    pub fn settlement_price(&self) -> Option<f64> {
        self.last.filter(|p| p.is_finite()).or_else(|| self.mid())
    }
}

/// Identity of a contract observation: (ticker, trade_date, type, strike, expiry).
#[derive(Debug, Clone)]
pub struct QuoteKey {
    pub ticker: String,
    pub trade_date: NaiveDate,
    pub option_type: OptionType,
    pub strike: f64,
    pub expiry: NaiveDate,
}

impl PartialEq for QuoteKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QuoteKey {}

impl PartialOrd for QuoteKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QuoteKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ticker
            .cmp(&other.ticker)
            .then(self.trade_date.cmp(&other.trade_date))
            .then(self.option_type.cmp(&other.option_type))
            .then(self.strike.total_cmp(&other.strike))
            .then(self.expiry.cmp(&other.expiry))
    }
}

/// Inclusive trade-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// "YYYY-MM" label of the first month in the range.
    pub fn month_label(&self) -> String {
        format!("{:04}-{:02}", self.start.year(), self.start.month())
    }
}
