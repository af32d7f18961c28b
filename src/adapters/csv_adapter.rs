//! CSV quote adapter.
//!
//! Loads a whole quote file into memory. The header must name the [`Quote`]
//! fields; empty cells read as missing values. Rows are deduplicated once at
//! load, so every query sees canonical quotes only.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;

use crate::domain::dedup::{count_duplicate_keys, dedup_quotes};
use crate::domain::error::OptstudyError;
use crate::domain::quote::{DateRange, OptionType, Quote, QuoteKey};
use crate::ports::quote_port::{QuoteQuery, QuoteSource, QuoteStore};

/// Reads every row of a quote CSV, duplicates included.
pub fn read_quotes<P: AsRef<Path>>(path: P) -> Result<Vec<Quote>, OptstudyError> {
    let path = path.as_ref();
    let mut rdr = csv::Reader::from_path(path).map_err(|e| OptstudyError::Database {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;

    let mut quotes = Vec::new();
    for (line, result) in rdr.deserialize::<Quote>().enumerate() {
        let quote = result.map_err(|e| OptstudyError::Database {
            reason: format!("{} row {}: {}", path.display(), line + 1, e),
        })?;
        quotes.push(quote);
    }
    Ok(quotes)
}

/// Writes quotes with the same header [`read_quotes`] expects.
pub fn write_quotes<P: AsRef<Path>>(path: P, quotes: &[Quote]) -> Result<(), OptstudyError> {
    let path = path.as_ref();
    let report_err = |e: csv::Error| OptstudyError::Report {
        reason: format!("failed to write {}: {}", path.display(), e),
    };
    let mut wtr = csv::Writer::from_path(path).map_err(report_err)?;
    for quote in quotes {
        wtr.serialize(quote).map_err(report_err)?;
    }
    wtr.flush()?;
    Ok(())
}

/// In-memory, deduplicated [`QuoteSource`].
pub struct CsvQuoteAdapter {
    quotes: Vec<Quote>,
    index: BTreeMap<QuoteKey, usize>,
}

impl CsvQuoteAdapter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, OptstudyError> {
        Ok(Self::from_quotes(read_quotes(path)?))
    }

    pub fn from_quotes(quotes: Vec<Quote>) -> Self {
        let mut quotes = dedup_quotes(quotes);
        quotes.sort_by(|a, b| {
            a.trade_date
                .cmp(&b.trade_date)
                .then(a.expiry.cmp(&b.expiry))
                .then(a.strike.total_cmp(&b.strike))
                .then(a.ticker.cmp(&b.ticker))
                .then(a.option_type.cmp(&b.option_type))
        });
        let index = quotes
            .iter()
            .enumerate()
            .map(|(i, q)| (q.key(), i))
            .collect();
        Self { quotes, index }
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

impl QuoteSource for CsvQuoteAdapter {
    fn fetch_quotes(&self, query: &QuoteQuery) -> Result<Vec<Quote>, OptstudyError> {
        Ok(self
            .quotes
            .iter()
            .filter(|q| query.matches(q))
            .cloned()
            .collect())
    }

    fn fetch_quote_on(
        &self,
        ticker: &str,
        option_type: OptionType,
        strike: f64,
        expiry: NaiveDate,
        trade_date: NaiveDate,
    ) -> Result<Option<Quote>, OptstudyError> {
        let key = QuoteKey {
            ticker: ticker.to_string(),
            trade_date,
            option_type,
            strike,
            expiry,
        };
        Ok(self.index.get(&key).map(|&i| self.quotes[i].clone()))
    }
}

/// Raw rows held in memory for the destructive dedup rewrite.
#[derive(Debug, Default)]
pub struct MemoryQuoteStore {
    rows: Vec<Quote>,
    staged: Option<Vec<Quote>>,
}

impl MemoryQuoteStore {
    pub fn new(rows: Vec<Quote>) -> Self {
        Self { rows, staged: None }
    }

    pub fn rows(&self) -> &[Quote] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Quote> {
        self.rows
    }

    fn in_range<'a>(&'a self, range: &'a DateRange) -> impl Iterator<Item = &'a Quote> + 'a {
        self.rows.iter().filter(move |q| range.contains(q.trade_date))
    }
}

impl QuoteStore for MemoryQuoteStore {
    fn count_rows(&self, range: &DateRange) -> Result<usize, OptstudyError> {
        Ok(self.in_range(range).count())
    }

    fn count_duplicate_keys(&self, range: &DateRange) -> Result<usize, OptstudyError> {
        let rows: Vec<Quote> = self.in_range(range).cloned().collect();
        Ok(count_duplicate_keys(&rows))
    }

    fn stage_deduplicated(&mut self, range: &DateRange) -> Result<usize, OptstudyError> {
        let staged = dedup_quotes(self.in_range(range).cloned().collect());
        let count = staged.len();
        self.staged = Some(staged);
        Ok(count)
    }

    fn replace_from_staged(&mut self, range: &DateRange) -> Result<(), OptstudyError> {
        let staged = self.staged.take().ok_or_else(|| OptstudyError::DedupInvariant {
            partition: range.month_label(),
            reason: "nothing staged".to_string(),
        })?;
        self.rows.retain(|q| !range.contains(q.trade_date));
        self.rows.extend(staged);
        Ok(())
    }

    fn discard_staged(&mut self) -> Result<(), OptstudyError> {
        self.staged = None;
        Ok(())
    }
}
