//! CLI definition and dispatch.

use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use crate::adapters::csv_adapter::CsvQuoteAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::{load_study_config, validate_study_config};
use crate::domain::error::OptstudyError;
use crate::domain::implied_vol::implied_vol;
use crate::domain::metrics::StudySummary;
use crate::domain::quote::{DateRange, OptionType};
use crate::domain::study::{run_study, StudyConfig, StudyResult};
use crate::domain::universe::parse_tickers;
use crate::ports::config_port::ConfigPort;
use crate::ports::quote_port::QuoteSource;
use crate::ports::report_port::{ReportPort, WrittenReport};

const DAYS_PER_YEAR: f64 = 365.0;

#[derive(Parser, Debug)]
#[command(name = "optstudy", about = "Multi-leg option strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a strategy study
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated tickers replacing [study] tickers
        #[arg(long)]
        ticker: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Validate and print the study without touching data
        #[arg(long)]
        dry_run: bool,
    },
    /// Rewrite stored quotes month by month, keeping one row per contract-day
    Dedup {
        #[arg(short, long)]
        config: PathBuf,
        /// First month, YYYY-MM
        #[arg(long)]
        start: String,
        /// Last month, YYYY-MM
        #[arg(long)]
        end: String,
        #[arg(long)]
        dry_run: bool,
    },
    /// Implied volatility of a European option price
    Iv {
        #[arg(long)]
        price: f64,
        #[arg(long)]
        spot: f64,
        #[arg(long)]
        strike: f64,
        /// Calendar days to expiry
        #[arg(long)]
        days: f64,
        #[arg(long, default_value_t = 0.0)]
        rate: f64,
        #[arg(long, default_value_t = 0.0)]
        dividend: f64,
        #[arg(long = "type", value_parser = parse_option_type)]
        option_type: OptionType,
    },
    /// Validate a study configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn parse_option_type(s: &str) -> Result<OptionType, String> {
    OptionType::parse(s).ok_or_else(|| format!("unknown option type '{s}' (expected call or put)"))
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            ticker,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config, ticker.as_deref())
            } else {
                run_backtest(&config, ticker.as_deref(), output.as_deref())
            }
        }
        Command::Dedup {
            config,
            start,
            end,
            dry_run,
        } => run_dedup(&config, &start, &end, dry_run),
        Command::Iv {
            price,
            spot,
            strike,
            days,
            rate,
            dividend,
            option_type,
        } => run_iv(price, spot, strike, days, rate, dividend, option_type),
        Command::Validate { config } => run_validate(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, OptstudyError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

/// Loads the study, replacing the configured tickers when `ticker_override`
/// is given.
pub fn build_study_config(
    config: &dyn ConfigPort,
    ticker_override: Option<&str>,
) -> Result<StudyConfig, OptstudyError> {
    let mut study = load_study_config(config)?;
    if let Some(tickers) = ticker_override {
        study.tickers = parse_tickers(tickers)
            .map_err(|e| OptstudyError::config_invalid("study", "tickers", e.to_string()))?;
    }
    Ok(study)
}

/// Opens the quote source named by `[data] source`.
pub fn open_quote_source(config: &dyn ConfigPort) -> Result<Box<dyn QuoteSource>, OptstudyError> {
    let source = config.get_string_or("data", "source", "sqlite").to_lowercase();
    match source.as_str() {
        "csv" => {
            let path = config
                .get_string("data", "csv_path")
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| OptstudyError::config_missing("data", "csv_path"))?;
            let adapter = CsvQuoteAdapter::from_path(path.trim())?;
            info!(rows = adapter.len(), path = %path.trim(), "loaded quote csv");
            Ok(Box::new(adapter))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            use crate::adapters::sqlite_adapter::SqliteAdapter;
            Ok(Box::new(SqliteAdapter::from_config(config)?))
        }
        #[cfg(not(feature = "sqlite"))]
        "sqlite" => Err(OptstudyError::config_invalid(
            "data",
            "source",
            "sqlite feature is required",
        )),
        other => Err(OptstudyError::config_invalid(
            "data",
            "source",
            format!("unknown source '{other}' (expected csv or sqlite)"),
        )),
    }
}

/// Runs the study against `source` and hands the result to `report`.
pub fn run_study_pipeline(
    source: &dyn QuoteSource,
    study: &StudyConfig,
    report: &dyn ReportPort,
) -> Result<(StudyResult, WrittenReport), OptstudyError> {
    let result = run_study(source, study)?;
    let written = report.write_study(&result)?;
    Ok((result, written))
}

fn run_backtest(
    config_path: &Path,
    ticker_override: Option<&str>,
    output: Option<&Path>,
) -> Result<(), OptstudyError> {
    let config = load_config(config_path)?;
    let study = build_study_config(&config, ticker_override)?;
    eprintln!(
        "Running {} over {} ticker(s), {} to {}",
        study.strategy.name,
        study.tickers.len(),
        study.range.start,
        study.range.end
    );

    let source = open_quote_source(&config)?;
    let output_dir = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(config.get_string_or("report", "output_dir", "output")));
    let report = CsvReportAdapter::new(output_dir);

    let (result, written) = run_study_pipeline(source.as_ref(), &study, &report)?;

    for skipped in &result.skipped {
        eprintln!("Skipped {}: {}", skipped.ticker, skipped.reason);
    }
    eprintln!("\n{}", summary_header());
    for summary in result.summaries() {
        eprintln!("{}", format_summary(summary));
    }
    eprintln!("\nDetail:  {}", written.detail.display());
    eprintln!("Summary: {}", written.summary.display());
    Ok(())
}

fn run_dry_run(config_path: &Path, ticker_override: Option<&str>) -> Result<(), OptstudyError> {
    let config = load_config(config_path)?;
    validate_study_config(&config)?;
    let study = build_study_config(&config, ticker_override)?;
    eprintln!("Config validated successfully\n");
    print_study(&study);
    eprintln!("\nDry run complete. No data was read.");
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), OptstudyError> {
    let config = load_config(config_path)?;
    validate_study_config(&config)?;
    let study = load_study_config(&config)?;
    print_study(&study);
    eprintln!("\nConfiguration is valid.");
    Ok(())
}

fn print_study(study: &StudyConfig) {
    if !study.description.is_empty() {
        eprintln!("{}", study.description);
    }
    eprintln!("Strategy: {}", study.strategy.name);
    for (i, leg) in study.strategy.legs.iter().enumerate() {
        eprintln!("  leg {}: {}", i + 1, leg);
    }
    eprintln!("Tickers:  {}", study.tickers.join(", "));
    eprintln!("Range:    {} to {}", study.range.start, study.range.end);
    eprintln!("Mode:     {:?}", study.mode);
    eprintln!("All legs: {}", study.require_all_legs);
    eprintln!("Exit:     {:?}", study.exit_policy);
    if let Some(weekdays) = &study.weekdays {
        eprintln!("Weekdays: {:?}", weekdays.weekdays());
    }
}

/// Parses `YYYY-MM` into the first day of that month.
pub fn parse_month(value: &str) -> Result<NaiveDate, OptstudyError> {
    NaiveDate::parse_from_str(&format!("{}-01", value.trim()), "%Y-%m-%d").map_err(|_| {
        OptstudyError::config_invalid("dedup", "month", format!("'{value}' is not YYYY-MM"))
    })
}

/// Inclusive range from the first day of `start` to the last day of `end`.
pub fn month_span(start: &str, end: &str) -> Result<DateRange, OptstudyError> {
    let first = parse_month(start)?;
    let last_month = parse_month(end)?;
    if last_month < first {
        return Err(OptstudyError::config_invalid(
            "dedup",
            "end",
            format!("{end} is before {start}"),
        ));
    }
    let (y, m) = if last_month.month() == 12 {
        (last_month.year() + 1, 1)
    } else {
        (last_month.year(), last_month.month() + 1)
    };
    let last = NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|d| d.pred_opt())
        .ok_or_else(|| OptstudyError::config_invalid("dedup", "end", "month out of range"))?;
    Ok(DateRange::new(first, last))
}

#[cfg(feature = "sqlite")]
fn run_dedup(
    config_path: &Path,
    start: &str,
    end: &str,
    dry_run: bool,
) -> Result<(), OptstudyError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;
    use crate::domain::dedup::{month_partitions, rewrite_months, RewriteOutcome};

    let span = month_span(start, end)?;
    let config = load_config(config_path)?;
    let mut store = SqliteAdapter::from_config(&config)?;
    let months = month_partitions(&span);
    eprintln!(
        "Deduplicating {} month(s){}",
        months.len(),
        if dry_run { " (dry run)" } else { "" }
    );

    let reports = rewrite_months(&mut store, &months, dry_run)?;
    let mut removed = 0;
    for report in &reports {
        let status = match report.outcome {
            RewriteOutcome::NoDuplicates => "clean".to_string(),
            RewriteOutcome::DryRun => "would rewrite".to_string(),
            RewriteOutcome::Rewritten { rows_after } => format!("rewritten, {rows_after} rows"),
        };
        removed += report.rows_removed();
        eprintln!(
            "{}  rows={:<10} duplicate_keys={:<8} {}",
            report.partition, report.rows_before, report.duplicate_keys, status
        );
    }
    eprintln!("Removed {removed} row(s)");
    Ok(())
}

#[cfg(not(feature = "sqlite"))]
fn run_dedup(
    _config_path: &Path,
    _start: &str,
    _end: &str,
    _dry_run: bool,
) -> Result<(), OptstudyError> {
    Err(OptstudyError::config_invalid(
        "data",
        "source",
        "sqlite feature is required for dedup",
    ))
}

fn run_iv(
    price: f64,
    spot: f64,
    strike: f64,
    days: f64,
    rate: f64,
    dividend: f64,
    option_type: OptionType,
) -> Result<(), OptstudyError> {
    match implied_vol(price, spot, strike, days / DAYS_PER_YEAR, rate, dividend, option_type) {
        Some(vol) => println!("{vol:.6}"),
        None => {
            eprintln!("No volatility reproduces {option_type} price {price}");
            println!("n/a");
        }
    }
    Ok(())
}

pub fn summary_header() -> String {
    format!(
        "{:<8} {:<6} {:>7} {:>12} {:>9} {:>9} {:>9} {:>9} {:>10}",
        "ticker", "price", "entries", "total_pnl", "roc", "ret/cr", "win%", "avg_roc", "avg_ret/cr"
    )
}

fn pct(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.2}%", v * 100.0))
        .unwrap_or_else(|| "n/a".to_string())
}

pub fn format_summary(s: &StudySummary) -> String {
    format!(
        "{:<8} {:<6} {:>7} {:>12.2} {:>9} {:>9} {:>9} {:>9} {:>10}",
        s.ticker,
        s.regime.label(),
        s.entries,
        s.total_pnl,
        pct(s.roc),
        pct(s.return_on_credit),
        pct(s.win_rate),
        pct(s.avg_roc),
        pct(s.avg_return_on_credit)
    )
}
