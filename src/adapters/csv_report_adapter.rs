//! CSV report adapter implementing [`ReportPort`].
//!
//! Writes `study_detail_<stamp>.csv` (one row per valued outcome, both
//! regimes) and `study_summary_<stamp>.csv` (per ticker and pooled).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::Serialize;
use tracing::info;

use crate::domain::error::OptstudyError;
use crate::domain::metrics::StudySummary;
use crate::domain::study::StudyResult;
use crate::domain::valuation::PortfolioOutcome;
use crate::ports::report_port::{ReportPort, WrittenReport};

#[derive(Debug, Serialize)]
struct DetailRow<'a> {
    ticker: &'a str,
    entry_date: NaiveDate,
    expiry: NaiveDate,
    pricing: &'static str,
    shape: &'static str,
    legs: usize,
    total_contracts: u32,
    portfolio_pnl: f64,
    net_entry_premium: f64,
    return_on_credit: Option<f64>,
    capital: Option<f64>,
    roc: Option<f64>,
    short_call_delta: Option<f64>,
    short_put_delta: Option<f64>,
}

impl<'a> From<&'a PortfolioOutcome> for DetailRow<'a> {
    fn from(o: &'a PortfolioOutcome) -> Self {
        Self {
            ticker: &o.ticker,
            entry_date: o.entry_date,
            expiry: o.expiry,
            pricing: o.regime.label(),
            shape: o.shape.label(),
            legs: o.legs,
            total_contracts: o.total_contracts,
            portfolio_pnl: o.portfolio_pnl,
            net_entry_premium: o.net_entry_premium,
            return_on_credit: o.return_on_credit,
            capital: o.capital,
            roc: o.roc,
            short_call_delta: o.short_call_delta,
            short_put_delta: o.short_put_delta,
        }
    }
}

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    ticker: &'a str,
    pricing: &'static str,
    n_entries: usize,
    total_pnl: f64,
    total_capital: f64,
    total_net_premium: f64,
    roc: Option<f64>,
    return_on_credit: Option<f64>,
    win_rate: Option<f64>,
    avg_roc: Option<f64>,
    stddev_roc: Option<f64>,
    avg_return_on_credit: Option<f64>,
    largest_win: f64,
    largest_loss: f64,
    max_drawdown: f64,
}

impl<'a> From<&'a StudySummary> for SummaryRow<'a> {
    fn from(s: &'a StudySummary) -> Self {
        Self {
            ticker: &s.ticker,
            pricing: s.regime.label(),
            n_entries: s.entries,
            total_pnl: s.total_pnl,
            total_capital: s.total_capital,
            total_net_premium: s.total_net_premium,
            roc: s.roc,
            return_on_credit: s.return_on_credit,
            win_rate: s.win_rate,
            avg_roc: s.avg_roc,
            stddev_roc: s.stddev_roc,
            avg_return_on_credit: s.avg_return_on_credit,
            largest_win: s.largest_win,
            largest_loss: s.largest_loss,
            max_drawdown: s.max_drawdown,
        }
    }
}

pub struct CsvReportAdapter {
    output_dir: PathBuf,
    stamp: String,
}

impl CsvReportAdapter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self::with_stamp(output_dir, Local::now().format("%Y%m%d_%H%M%S").to_string())
    }

    /// Fixed file stamp, for reproducible file names.
    pub fn with_stamp(output_dir: impl Into<PathBuf>, stamp: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            stamp: stamp.into(),
        }
    }

    fn path_for(&self, kind: &str) -> PathBuf {
        self.output_dir
            .join(format!("study_{kind}_{}.csv", self.stamp))
    }
}

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<(), OptstudyError> {
    let report_err = |e: csv::Error| OptstudyError::Report {
        reason: format!("failed to write {}: {}", path.display(), e),
    };
    let mut wtr = csv::Writer::from_path(path).map_err(report_err)?;
    for row in rows {
        wtr.serialize(row).map_err(report_err)?;
    }
    wtr.flush()?;
    Ok(())
}

impl ReportPort for CsvReportAdapter {
    fn write_study(&self, result: &StudyResult) -> Result<WrittenReport, OptstudyError> {
        fs::create_dir_all(&self.output_dir)?;

        let detail = self.path_for("detail");
        let outcomes = result
            .studies
            .iter()
            .flat_map(|s| s.valuations())
            .flat_map(|v| v.outcomes.iter())
            .map(DetailRow::from);
        write_rows(&detail, outcomes)?;

        let summary = self.path_for("summary");
        write_rows(&summary, result.summaries().into_iter().map(SummaryRow::from))?;

        info!(detail = %detail.display(), summary = %summary.display(), "report written");
        Ok(WrittenReport { detail, summary })
    }
}
