#![allow(dead_code)]

use chrono::NaiveDate;
use optstudy::domain::error::OptstudyError;
use optstudy::domain::quote::{OptionType, Quote};
use optstudy::ports::quote_port::{QuoteQuery, QuoteSource};
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory quote source that counts point lookups.
pub struct MockQuoteSource {
    pub quotes: Vec<Quote>,
    lookups: AtomicUsize,
}

impl MockQuoteSource {
    pub fn new(quotes: Vec<Quote>) -> Self {
        Self {
            quotes,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl QuoteSource for MockQuoteSource {
    fn fetch_quotes(&self, query: &QuoteQuery) -> Result<Vec<Quote>, OptstudyError> {
        let mut quotes: Vec<Quote> = self
            .quotes
            .iter()
            .filter(|q| query.matches(q))
            .cloned()
            .collect();
        quotes.sort_by(|a, b| {
            a.trade_date
                .cmp(&b.trade_date)
                .then(a.expiry.cmp(&b.expiry))
                .then(a.strike.total_cmp(&b.strike))
        });
        Ok(quotes)
    }

    fn fetch_quote_on(
        &self,
        ticker: &str,
        option_type: OptionType,
        strike: f64,
        expiry: NaiveDate,
        trade_date: NaiveDate,
    ) -> Result<Option<Quote>, OptstudyError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .quotes
            .iter()
            .find(|q| {
                q.ticker == ticker
                    && q.option_type == option_type
                    && q.strike == strike
                    && q.expiry == expiry
                    && q.trade_date == trade_date
            })
            .cloned())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn quote(
    ticker: &str,
    trade_date: NaiveDate,
    expiry: NaiveDate,
    option_type: OptionType,
    strike: f64,
    bid: f64,
    ask: f64,
    delta: f64,
) -> Quote {
    Quote {
        ticker: ticker.to_string(),
        trade_date,
        expiry,
        option_type,
        strike,
        bid: Some(bid),
        ask: Some(ask),
        last: None,
        bid_iv: None,
        ask_iv: None,
        open_interest: Some(100),
        volume: Some(10),
        delta: Some(delta),
        gamma: None,
        theta: None,
        vega: None,
        rho: None,
    }
}

/// Settlement-day quote carrying only a last price.
pub fn settlement(
    ticker: &str,
    expiry: NaiveDate,
    option_type: OptionType,
    strike: f64,
    last: f64,
) -> Quote {
    Quote {
        bid: None,
        ask: None,
        delta: None,
        last: Some(last),
        ..quote(ticker, expiry, expiry, option_type, strike, 0.0, 0.0, 0.0)
    }
}

pub const EXPIRY: (i32, u32, u32) = (2024, 2, 1);

pub fn expiry() -> NaiveDate {
    date(EXPIRY.0, EXPIRY.1, EXPIRY.2)
}

/// One trade date of a four-strike chain expiring on [`expiry`]:
/// 480C Δ0.25 2.0/2.2, 490C Δ0.10 0.5/0.7, 440P Δ-0.25 2.5/2.7,
/// 430P Δ-0.10 0.8/1.0.
pub fn condor_chain(ticker: &str, trade_date: NaiveDate) -> Vec<Quote> {
    let exp = expiry();
    vec![
        quote(ticker, trade_date, exp, OptionType::Call, 480.0, 2.0, 2.2, 0.25),
        quote(ticker, trade_date, exp, OptionType::Call, 490.0, 0.5, 0.7, 0.10),
        quote(ticker, trade_date, exp, OptionType::Put, 440.0, 2.5, 2.7, -0.25),
        quote(ticker, trade_date, exp, OptionType::Put, 430.0, 0.8, 1.0, -0.10),
    ]
}

/// Settlement quotes for the chain; `call_480` lets the short call finish
/// in the money.
pub fn condor_settlement(ticker: &str, call_480: f64) -> Vec<Quote> {
    let exp = expiry();
    vec![
        settlement(ticker, exp, OptionType::Call, 480.0, call_480),
        settlement(ticker, exp, OptionType::Call, 490.0, 0.0),
        settlement(ticker, exp, OptionType::Put, 440.0, 0.0),
        settlement(ticker, exp, OptionType::Put, 430.0, 0.0),
    ]
}

/// SPY chains on 2024-01-02 and 2024-01-03, all strikes expiring worthless.
pub fn condor_market() -> Vec<Quote> {
    let mut quotes = condor_chain("SPY", date(2024, 1, 2));
    quotes.extend(condor_chain("SPY", date(2024, 1, 3)));
    quotes.extend(condor_settlement("SPY", 0.0));
    quotes
}
