//! Strategy shape recognition and capital-at-risk approximations.
//!
//! These are estimates of buying-power reduction, not a broker margin model.
//! A shape that is neither a full iron condor nor an all-short
//! strangle/straddle has no capital figure.

use crate::domain::leg::Direction;
use crate::domain::quote::{OptionType, CONTRACT_MULTIPLIER};

/// The fields of a valued leg that the capital model needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarginLeg {
    pub direction: Direction,
    pub option_type: OptionType,
    pub strike: f64,
    pub quantity: u32,
    /// Per-share entry premium under the active pricing regime.
    pub premium: f64,
}

impl MarginLeg {
    fn is(&self, direction: Direction, option_type: OptionType) -> bool {
        self.direction == direction && self.option_type == option_type
    }
}

/// Shape of one (entry_date, expiry) group, decided once from its legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyShape {
    IronCondor,
    StrangleOrStraddle,
    Unrecognized,
}

impl StrategyShape {
    pub fn classify(legs: &[MarginLeg]) -> Self {
        let has = |d, t| legs.iter().any(|l| l.is(d, t));
        if has(Direction::Sell, OptionType::Call)
            && has(Direction::Buy, OptionType::Call)
            && has(Direction::Sell, OptionType::Put)
            && has(Direction::Buy, OptionType::Put)
        {
            StrategyShape::IronCondor
        } else if !legs.is_empty() && legs.iter().all(|l| l.direction == Direction::Sell) {
            StrategyShape::StrangleOrStraddle
        } else {
            StrategyShape::Unrecognized
        }
    }

    /// Capital at risk in dollars, `None` where the shape has no defined figure.
    pub fn capital(&self, legs: &[MarginLeg], net_entry_premium: f64) -> Option<f64> {
        let capital = match self {
            StrategyShape::IronCondor => condor_capital(legs, net_entry_premium),
            StrategyShape::StrangleOrStraddle => strangle_capital(legs),
            StrategyShape::Unrecognized => None,
        }?;
        capital.is_finite().then_some(capital)
    }

    pub fn label(&self) -> &'static str {
        match self {
            StrategyShape::IronCondor => "iron_condor",
            StrategyShape::StrangleOrStraddle => "strangle",
            StrategyShape::Unrecognized => "unrecognized",
        }
    }
}

impl std::fmt::Display for StrategyShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Max wing width times spreads, less the credit, floored at zero.
///
/// The first leg of each role (short/long call, short/long put) defines the
/// wing. Both widths zero leaves capital undefined.
pub fn condor_capital(legs: &[MarginLeg], net_entry_premium: f64) -> Option<f64> {
    let first = |d, t| legs.iter().find(|l: &&MarginLeg| l.is(d, t));
    let sc = first(Direction::Sell, OptionType::Call)?;
    let lc = first(Direction::Buy, OptionType::Call)?;
    let sp = first(Direction::Sell, OptionType::Put)?;
    let lp = first(Direction::Buy, OptionType::Put)?;

    let call_width = (lc.strike - sc.strike).max(0.0);
    let put_width = (sp.strike - lp.strike).max(0.0);
    if call_width == 0.0 && put_width == 0.0 {
        return None;
    }

    let spreads = sc
        .quantity
        .min(lc.quantity)
        .min(sp.quantity)
        .min(lp.quantity);
    let credit = -net_entry_premium;
    let max_loss = call_width.max(put_width) * CONTRACT_MULTIPLIER * f64::from(spreads);
    Some((max_loss - credit).max(0.0))
}

/// Larger of the call-side and put-side naked short margins.
///
/// The underlying is approximated by the mean of the short strikes. Each
/// short leg contributes `max(20% U - OTM + premium, 10% base + premium)`
/// per share, where base is U for calls and the leg's strike for puts.
pub fn strangle_capital(legs: &[MarginLeg]) -> Option<f64> {
    let shorts: Vec<&MarginLeg> = legs
        .iter()
        .filter(|l| l.direction == Direction::Sell)
        .collect();
    if shorts.is_empty() {
        return None;
    }
    let underlying = shorts.iter().map(|l| l.strike).sum::<f64>() / shorts.len() as f64;

    let side = |option_type: OptionType| -> f64 {
        shorts
            .iter()
            .filter(|l| l.option_type == option_type)
            .map(|l| side_margin(l, underlying))
            .sum()
    };
    Some(side(OptionType::Call).max(side(OptionType::Put)))
}

fn side_margin(leg: &MarginLeg, underlying: f64) -> f64 {
    let (otm, base) = match leg.option_type {
        OptionType::Call => ((leg.strike - underlying).max(0.0), underlying),
        OptionType::Put => ((underlying - leg.strike).max(0.0), leg.strike),
    };
    let per_share = (0.20 * underlying - otm + leg.premium).max(0.10 * base + leg.premium);
    per_share * CONTRACT_MULTIPLIER * f64::from(leg.quantity)
}
