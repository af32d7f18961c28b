//! Study statistics over valued outcomes.

use crate::domain::valuation::{PortfolioOutcome, PricingRegime};

#[derive(Debug, Clone, PartialEq)]
pub struct StudySummary {
    pub ticker: String,
    pub regime: PricingRegime,
    pub entries: usize,
    pub wins: usize,
    pub total_pnl: f64,
    /// Sum over outcomes with a defined capital figure.
    pub total_capital: f64,
    pub total_net_premium: f64,
    /// Sum of credits received, positive dollars.
    pub total_credit: f64,
    /// Pooled: sum of pnl over sum of capital, capital-defined outcomes only.
    pub roc: Option<f64>,
    /// Pooled: sum of pnl over sum of credit, credit outcomes only.
    pub return_on_credit: Option<f64>,
    pub win_rate: Option<f64>,
    pub avg_roc: Option<f64>,
    /// Sample standard deviation (n - 1) of per-entry ROC.
    pub stddev_roc: Option<f64>,
    pub avg_return_on_credit: Option<f64>,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Largest peak-to-trough fall of cumulative P&L, in entry-date order.
    pub max_drawdown: f64,
}

impl StudySummary {
    pub fn compute(ticker: &str, regime: PricingRegime, outcomes: &[PortfolioOutcome]) -> Self {
        let entries = outcomes.len();
        let total_pnl: f64 = outcomes.iter().map(|o| o.portfolio_pnl).sum();
        let total_net_premium: f64 = outcomes.iter().map(|o| o.net_entry_premium).sum();

        let mut capital_pnl = 0.0_f64;
        let mut total_capital = 0.0_f64;
        for o in outcomes {
            if let Some(capital) = o.capital {
                capital_pnl += o.portfolio_pnl;
                total_capital += capital;
            }
        }

        let mut credit_pnl = 0.0_f64;
        let mut total_credit = 0.0_f64;
        for o in outcomes.iter().filter(|o| o.is_credit()) {
            credit_pnl += o.portfolio_pnl;
            total_credit += -o.net_entry_premium;
        }

        let wins = outcomes.iter().filter(|o| o.is_win()).count();
        let win_rate = (entries > 0).then(|| wins as f64 / entries as f64);

        let rocs: Vec<f64> = outcomes.iter().filter_map(|o| o.roc).collect();
        let rocs_on_credit: Vec<f64> = outcomes.iter().filter_map(|o| o.return_on_credit).collect();

        let largest_win = outcomes
            .iter()
            .map(|o| o.portfolio_pnl)
            .fold(0.0_f64, f64::max);
        let largest_loss = outcomes
            .iter()
            .map(|o| -o.portfolio_pnl)
            .fold(0.0_f64, f64::max);

        StudySummary {
            ticker: ticker.to_string(),
            regime,
            entries,
            wins,
            total_pnl,
            total_capital,
            total_net_premium,
            total_credit,
            roc: safe_ratio(capital_pnl, total_capital),
            return_on_credit: safe_ratio(credit_pnl, total_credit),
            win_rate,
            avg_roc: mean(&rocs),
            stddev_roc: sample_stddev(&rocs),
            avg_return_on_credit: mean(&rocs_on_credit),
            largest_win,
            largest_loss,
            max_drawdown: compute_drawdown(outcomes),
        }
    }
}

fn safe_ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator > 1e-9 {
        Some(numerator / denominator).filter(|r| r.is_finite())
    } else {
        None
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn sample_stddev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let n = values.len() as f64;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}

fn compute_drawdown(outcomes: &[PortfolioOutcome]) -> f64 {
    let mut ordered: Vec<&PortfolioOutcome> = outcomes.iter().collect();
    ordered.sort_by_key(|o| (o.entry_date, o.expiry));

    let mut cumulative = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut max_dd = 0.0_f64;
    for o in ordered {
        cumulative += o.portfolio_pnl;
        peak = peak.max(cumulative);
        max_dd = max_dd.max(peak - cumulative);
    }
    max_dd
}
