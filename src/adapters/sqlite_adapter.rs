//! SQLite quote adapter.
//!
//! The `option_quotes` table keeps every vendor row, duplicates included.
//! Reads deduplicate inline with `ROW_NUMBER()` over the canonical ordering;
//! the destructive rewrite goes through a staging table.

use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Row};
use tracing::debug;

use crate::domain::dedup::{CANONICAL_ORDER_SQL, KEY_COLUMNS_SQL};
use crate::domain::error::OptstudyError;
use crate::domain::quote::{DateRange, OptionType, Quote};
use crate::ports::config_port::ConfigPort;
use crate::ports::quote_port::{ExpiryConstraint, QuoteQuery, QuoteSource, QuoteStore};

const QUOTE_COLUMNS: &str = "ticker, trade_date, expiry, option_type, strike, bid, ask, last, \
     bid_iv, ask_iv, open_interest, volume, delta, gamma, theta, vega, rho";

const STAGE_TABLE: &str = "option_quotes_dedup_stage";

const DATE_FMT: &str = "%Y-%m-%d";

fn db_err(e: r2d2::Error) -> OptstudyError {
    OptstudyError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> OptstudyError {
    OptstudyError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn fmt_date(date: NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

fn parse_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, DATE_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn quote_from_row(row: &Row<'_>) -> rusqlite::Result<Quote> {
    let code: String = row.get(3)?;
    let option_type = OptionType::parse(&code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown option type '{code}'").into(),
        )
    })?;
    Ok(Quote {
        ticker: row.get(0)?,
        trade_date: parse_date(row, 1)?,
        expiry: parse_date(row, 2)?,
        option_type,
        strike: row.get(4)?,
        bid: row.get(5)?,
        ask: row.get(6)?,
        last: row.get(7)?,
        bid_iv: row.get(8)?,
        ask_iv: row.get(9)?,
        open_interest: row.get(10)?,
        volume: row.get(11)?,
        delta: row.get(12)?,
        gamma: row.get(13)?,
        theta: row.get(14)?,
        vega: row.get(15)?,
        rho: row.get(16)?,
    })
}

/// `SELECT` of the canonical rows among those matching `filter`.
fn canonical_select(filter: &str) -> String {
    format!(
        "SELECT {QUOTE_COLUMNS} FROM (
             SELECT {QUOTE_COLUMNS}, ROW_NUMBER() OVER (
                 PARTITION BY {KEY_COLUMNS_SQL}
                 ORDER BY {CANONICAL_ORDER_SQL}, rowid ASC
             ) AS rn
             FROM option_quotes
             WHERE {filter}
         ) WHERE rn = 1"
    )
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, OptstudyError> {
        let db_path = config
            .get_string("sqlite", "path")
            .ok_or_else(|| OptstudyError::config_missing("sqlite", "path"))?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(db_err)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, OptstudyError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(db_err)?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, OptstudyError> {
        self.pool.get().map_err(db_err)
    }

    pub fn initialize_schema(&self) -> Result<(), OptstudyError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS option_quotes (
                    ticker TEXT NOT NULL,
                    trade_date TEXT NOT NULL,
                    expiry TEXT NOT NULL,
                    option_type TEXT NOT NULL,
                    strike REAL NOT NULL,
                    bid REAL,
                    ask REAL,
                    last REAL,
                    bid_iv REAL,
                    ask_iv REAL,
                    open_interest INTEGER,
                    volume INTEGER,
                    delta REAL,
                    gamma REAL,
                    theta REAL,
                    vega REAL,
                    rho REAL
                );
                CREATE INDEX IF NOT EXISTS idx_quotes_ticker_date
                    ON option_quotes(ticker, trade_date);
                CREATE INDEX IF NOT EXISTS idx_quotes_contract
                    ON option_quotes(ticker, option_type, strike, expiry, trade_date);",
            )
            .map_err(query_err)
    }

    /// Appends rows as-is; duplicates are kept for the dedup policy to resolve.
    pub fn insert_quotes(&self, quotes: &[Quote]) -> Result<usize, OptstudyError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO option_quotes ({QUOTE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
                ))
                .map_err(query_err)?;
            for q in quotes {
                stmt.execute(params![
                    q.ticker,
                    fmt_date(q.trade_date),
                    fmt_date(q.expiry),
                    q.option_type.code(),
                    q.strike,
                    q.bid,
                    q.ask,
                    q.last,
                    q.bid_iv,
                    q.ask_iv,
                    q.open_interest,
                    q.volume,
                    q.delta,
                    q.gamma,
                    q.theta,
                    q.vega,
                    q.rho
                ])
                .map_err(query_err)?;
            }
        }
        tx.commit().map_err(query_err)?;
        Ok(quotes.len())
    }

    fn query_quotes(&self, sql: &str, values: Vec<Value>) -> Result<Vec<Quote>, OptstudyError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(query_err)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), quote_from_row)
            .map_err(query_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(query_err)
    }

    fn count(&self, sql: &str, range: &DateRange) -> Result<usize, OptstudyError> {
        let n: i64 = self
            .conn()?
            .query_row(
                sql,
                params![fmt_date(range.start), fmt_date(range.end)],
                |row| row.get(0),
            )
            .map_err(query_err)?;
        Ok(n as usize)
    }
}

impl QuoteSource for SqliteAdapter {
    fn fetch_quotes(&self, query: &QuoteQuery) -> Result<Vec<Quote>, OptstudyError> {
        let mut filter = vec!["trade_date BETWEEN ? AND ?".to_string()];
        let mut values = vec![
            Value::Text(fmt_date(query.range.start)),
            Value::Text(fmt_date(query.range.end)),
        ];

        if !query.tickers.is_empty() {
            let placeholders = vec!["?"; query.tickers.len()].join(", ");
            filter.push(format!("ticker IN ({placeholders})"));
            values.extend(query.tickers.iter().cloned().map(Value::Text));
        }
        if let Some(option_type) = query.option_type {
            filter.push("option_type = ?".to_string());
            values.push(Value::Text(option_type.code().to_string()));
        }
        let dte = "CAST(julianday(expiry) - julianday(trade_date) AS INTEGER)";
        match query.expiry {
            ExpiryConstraint::Any => {}
            ExpiryConstraint::ExactDte(days) => {
                filter.push(format!("{dte} = ?"));
                values.push(Value::Integer(days));
            }
            ExpiryConstraint::MinDte(days) => {
                filter.push(format!("{dte} >= ?"));
                values.push(Value::Integer(days));
            }
        }

        let sql = format!(
            "{} ORDER BY trade_date, expiry, strike",
            canonical_select(&filter.join(" AND "))
        );
        let quotes = self.query_quotes(&sql, values)?;
        debug!(rows = quotes.len(), "sqlite quotes fetched");
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
        let sql = canonical_select(
            "ticker = ? AND option_type = ? AND strike = ? AND expiry = ? AND trade_date = ?",
        );
        let values = vec![
            Value::Text(ticker.to_string()),
            Value::Text(option_type.code().to_string()),
            Value::Real(strike),
            Value::Text(fmt_date(expiry)),
            Value::Text(fmt_date(trade_date)),
        ];
        Ok(self.query_quotes(&sql, values)?.into_iter().next())
    }
}

impl QuoteStore for SqliteAdapter {
    fn count_rows(&self, range: &DateRange) -> Result<usize, OptstudyError> {
        self.count(
            "SELECT COUNT(*) FROM option_quotes WHERE trade_date BETWEEN ?1 AND ?2",
            range,
        )
    }

    fn count_duplicate_keys(&self, range: &DateRange) -> Result<usize, OptstudyError> {
        self.count(
            &format!(
                "SELECT COUNT(*) FROM (
                     SELECT 1 FROM option_quotes
                     WHERE trade_date BETWEEN ?1 AND ?2
                     GROUP BY {KEY_COLUMNS_SQL}
                     HAVING COUNT(*) > 1
                 )"
            ),
            range,
        )
    }

    fn stage_deduplicated(&mut self, range: &DateRange) -> Result<usize, OptstudyError> {
        let conn = self.conn()?;
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {STAGE_TABLE}"))
            .map_err(query_err)?;
        conn.execute(
            &format!(
                "CREATE TABLE {STAGE_TABLE} AS {}",
                canonical_select("trade_date BETWEEN ?1 AND ?2")
            ),
            params![fmt_date(range.start), fmt_date(range.end)],
        )
        .map_err(query_err)?;
        let n: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {STAGE_TABLE}"), [], |row| {
                row.get(0)
            })
            .map_err(query_err)?;
        Ok(n as usize)
    }

    fn replace_from_staged(&mut self, range: &DateRange) -> Result<(), OptstudyError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        tx.execute(
            "DELETE FROM option_quotes WHERE trade_date BETWEEN ?1 AND ?2",
            params![fmt_date(range.start), fmt_date(range.end)],
        )
        .map_err(query_err)?;
        tx.execute(
            &format!(
                "INSERT INTO option_quotes ({QUOTE_COLUMNS}) SELECT {QUOTE_COLUMNS} FROM {STAGE_TABLE}"
            ),
            [],
        )
        .map_err(query_err)?;
        tx.commit().map_err(query_err)
    }

    fn discard_staged(&mut self) -> Result<(), OptstudyError> {
        self.conn()?
            .execute_batch(&format!("DROP TABLE IF EXISTS {STAGE_TABLE}"))
            .map_err(query_err)
    }
}
