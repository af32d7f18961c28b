//! Quote access ports.
//!
//! [`QuoteSource`] is the read contract the resolver and valuation engine
//! depend on. Implementations must return the deduplicated quote set (see
//! [`crate::domain::dedup`]) and must be idempotent: identical queries return
//! identical results. [`QuoteStore`] carries the primitives of the
//! destructive dedup rewrite.

use chrono::NaiveDate;

use crate::domain::error::OptstudyError;
use crate::domain::quote::{DateRange, OptionType, Quote};

/// Expiry predicate pushed down to the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryConstraint {
    #[default]
    Any,
    /// expiry == trade_date + days
    ExactDte(i64),
    /// expiry >= trade_date + days
    MinDte(i64),
}

impl ExpiryConstraint {
    pub fn accepts(&self, trade_date: NaiveDate, expiry: NaiveDate) -> bool {
        let dte = (expiry - trade_date).num_days();
        match *self {
            ExpiryConstraint::Any => true,
            ExpiryConstraint::ExactDte(days) => dte == days,
            ExpiryConstraint::MinDte(days) => dte >= days,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuoteQuery {
    pub tickers: Vec<String>,
    pub option_type: Option<OptionType>,
    pub range: DateRange,
    pub expiry: ExpiryConstraint,
}

impl QuoteQuery {
    pub fn for_ticker(ticker: &str, option_type: OptionType, range: DateRange) -> Self {
        Self {
            tickers: vec![ticker.to_string()],
            option_type: Some(option_type),
            range,
            expiry: ExpiryConstraint::Any,
        }
    }

    pub fn with_expiry(mut self, expiry: ExpiryConstraint) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn matches(&self, quote: &Quote) -> bool {
        (self.tickers.is_empty() || self.tickers.iter().any(|t| t == &quote.ticker))
            && self.option_type.is_none_or(|t| t == quote.option_type)
            && self.range.contains(quote.trade_date)
            && self.expiry.accepts(quote.trade_date, quote.expiry)
    }
}

pub trait QuoteSource: Send + Sync {
    /// Deduplicated quotes ordered by (trade_date, expiry, strike).
    fn fetch_quotes(&self, query: &QuoteQuery) -> Result<Vec<Quote>, OptstudyError>;

    /// The canonical quote for one contract on `trade_date`.
    fn fetch_quote_on(
        &self,
        ticker: &str,
        option_type: OptionType,
        strike: f64,
        expiry: NaiveDate,
        trade_date: NaiveDate,
    ) -> Result<Option<Quote>, OptstudyError>;

    /// The contract's quote on its own expiry date.
    fn fetch_expiry_quote(
        &self,
        ticker: &str,
        option_type: OptionType,
        strike: f64,
        expiry: NaiveDate,
    ) -> Result<Option<Quote>, OptstudyError> {
        self.fetch_quote_on(ticker, option_type, strike, expiry, expiry)
    }
}

/// Primitives for rewriting a trade-date partition in place.
pub trait QuoteStore {
    fn count_rows(&self, range: &DateRange) -> Result<usize, OptstudyError>;

    /// Number of keys with more than one row.
    fn count_duplicate_keys(&self, range: &DateRange) -> Result<usize, OptstudyError>;

    /// Writes the canonical rows of `range` to a staging area, returning the staged count.
    fn stage_deduplicated(&mut self, range: &DateRange) -> Result<usize, OptstudyError>;

    /// Deletes `range` and inserts the staged rows in its place.
    fn replace_from_staged(&mut self, range: &DateRange) -> Result<(), OptstudyError>;

    fn discard_staged(&mut self) -> Result<(), OptstudyError>;
}
