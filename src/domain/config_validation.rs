//! Configuration validation.
//!
//! Reads every study field through [`ConfigPort`] and rejects the config
//! before any quote is fetched. `load_study_config` is the only place the
//! `[study]` and `[strategy]` sections are interpreted.

use chrono::NaiveDate;

use crate::domain::error::OptstudyError;
use crate::domain::leg_resolver::{Guardrails, SelectionMode};
use crate::domain::quote::{DateRange, OptionType};
use crate::domain::strategy::Strategy;
use crate::domain::strategy_resolver::WeekdayFilter;
use crate::domain::study::StudyConfig;
use crate::domain::universe::parse_tickers;
use crate::domain::valuation::ExitPolicy;
use crate::ports::config_port::ConfigPort;

const STUDY: &str = "study";
const STRATEGY: &str = "strategy";

pub fn validate_study_config(config: &dyn ConfigPort) -> Result<(), OptstudyError> {
    load_study_config(config).map(|_| ())
}

pub fn load_study_config(config: &dyn ConfigPort) -> Result<StudyConfig, OptstudyError> {
    let range = load_dates(config)?;
    let tickers = load_tickers(config)?;
    let mode = load_mode(config)?;
    let weekdays = load_weekdays(config)?;
    let guardrails = load_guardrails(config)?;
    let exit_policy = load_exit_policy(config)?;
    let strategy = load_strategy(config)?;

    Ok(StudyConfig {
        description: non_empty(config, STUDY, "description").unwrap_or_default(),
        tickers,
        range,
        mode,
        require_all_legs: config.get_bool(STUDY, "require_all_legs", true),
        weekdays,
        guardrails,
        exit_policy,
        strategy,
    })
}

fn non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn load_dates(config: &dyn ConfigPort) -> Result<DateRange, OptstudyError> {
    let start_date = parse_date(config, "start_date")?;
    let end_date = parse_date(config, "end_date")?;
    if start_date > end_date {
        return Err(OptstudyError::config_invalid(
            STUDY,
            "start_date",
            "start_date must not be after end_date",
        ));
    }
    Ok(DateRange::new(start_date, end_date))
}

fn parse_date(config: &dyn ConfigPort, field: &str) -> Result<NaiveDate, OptstudyError> {
    let value =
        non_empty(config, STUDY, field).ok_or_else(|| OptstudyError::config_missing(STUDY, field))?;
    NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|_| {
        OptstudyError::config_invalid(
            STUDY,
            field,
            format!("invalid {field} format, expected YYYY-MM-DD"),
        )
    })
}

fn load_tickers(config: &dyn ConfigPort) -> Result<Vec<String>, OptstudyError> {
    let value = non_empty(config, STUDY, "tickers")
        .ok_or_else(|| OptstudyError::config_missing(STUDY, "tickers"))?;
    parse_tickers(&value).map_err(|e| OptstudyError::config_invalid(STUDY, "tickers", e.to_string()))
}

fn load_mode(config: &dyn ConfigPort) -> Result<SelectionMode, OptstudyError> {
    match non_empty(config, STUDY, "mode") {
        None => Ok(SelectionMode::default()),
        Some(s) => s
            .parse()
            .map_err(|reason: String| OptstudyError::config_invalid(STUDY, "mode", reason)),
    }
}

fn load_weekdays(config: &dyn ConfigPort) -> Result<Option<WeekdayFilter>, OptstudyError> {
    non_empty(config, STUDY, "entry_weekdays")
        .map(|s| {
            WeekdayFilter::parse(&s)
                .map_err(|e| OptstudyError::config_invalid(STUDY, "entry_weekdays", e.to_string()))
        })
        .transpose()
}

fn load_guardrails(config: &dyn ConfigPort) -> Result<Guardrails, OptstudyError> {
    let max_delta_error = non_empty(config, STUDY, "max_delta_error")
        .map(|s| match s.parse::<f64>() {
            Ok(v) if v > 0.0 && v <= 1.0 => Ok(v),
            _ => Err(OptstudyError::config_invalid(
                STUDY,
                "max_delta_error",
                "max_delta_error must be a number in (0, 1]",
            )),
        })
        .transpose()?;
    let max_dte_error = non_empty(config, STUDY, "max_dte_error")
        .map(|s| match s.parse::<i64>() {
            Ok(v) if v >= 0 => Ok(v),
            _ => Err(OptstudyError::config_invalid(
                STUDY,
                "max_dte_error",
                "max_dte_error must be a non-negative integer",
            )),
        })
        .transpose()?;
    Ok(Guardrails {
        max_delta_error,
        max_dte_error,
    })
}

fn load_exit_policy(config: &dyn ConfigPort) -> Result<ExitPolicy, OptstudyError> {
    match non_empty(config, STUDY, "exit_policy") {
        None => Ok(ExitPolicy::default()),
        Some(s) => s
            .parse()
            .map_err(|reason: String| OptstudyError::config_invalid(STUDY, "exit_policy", reason)),
    }
}

/// Explicit `legs` win over a `preset`.
fn load_strategy(config: &dyn ConfigPort) -> Result<Strategy, OptstudyError> {
    let name = non_empty(config, STRATEGY, "name");
    if let Some(legs) = non_empty(config, STRATEGY, "legs") {
        let strategy = Strategy::parse_legs(name.unwrap_or_else(|| "custom".to_string()), &legs)?;
        if strategy.legs.is_empty() {
            return Err(OptstudyError::config_invalid(STRATEGY, "legs", "no legs given"));
        }
        return Ok(strategy);
    }

    let preset = non_empty(config, STRATEGY, "preset")
        .ok_or_else(|| OptstudyError::config_missing(STRATEGY, "legs"))?;
    let dte = config.get_int(STRATEGY, "dte", 30);
    let short_delta = config.get_double(STRATEGY, "short_delta", 25.0);
    let long_delta = config.get_double(STRATEGY, "long_delta", 10.0);

    let mut strategy = match preset.to_lowercase().as_str() {
        "iron_condor" | "condor" => Strategy::iron_condor(short_delta, long_delta, dte)?,
        "strangle" => Strategy::short_strangle(
            config.get_double(STRATEGY, "call_delta", short_delta),
            config.get_double(STRATEGY, "put_delta", short_delta),
            dte,
        )?,
        "straddle" => Strategy::short_straddle(dte)?,
        "put_spread" => Strategy::credit_vertical(OptionType::Put, short_delta, long_delta, dte)?,
        "call_spread" => Strategy::credit_vertical(OptionType::Call, short_delta, long_delta, dte)?,
        other => {
            return Err(OptstudyError::config_invalid(
                STRATEGY,
                "preset",
                format!(
                    "unknown preset '{other}' (expected iron_condor, strangle, straddle, put_spread, call_spread)"
                ),
            ));
        }
    };
    if let Some(name) = name {
        strategy.name = name;
    }
    Ok(strategy)
}
