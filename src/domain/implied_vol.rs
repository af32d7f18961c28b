//! Black-Scholes pricing and the implied volatility root-finder.
//!
//! Newton-Raphson on analytic vega converges in a handful of steps for most
//! contracts but diverges for deep ITM/OTM strikes and for contracts a few
//! days from expiry, which daily history is full of. Those cases fall back
//! to bisection over a fixed volatility bracket.

use std::f64::consts::PI;

use statrs::distribution::{ContinuousCDF, Normal};

use crate::domain::quote::OptionType;

pub const INITIAL_GUESS: f64 = 0.30;
pub const MAX_ITERATIONS: usize = 100;
pub const PRICE_TOLERANCE: f64 = 1e-8;
pub const MIN_VEGA: f64 = 1e-12;
pub const VOL_LOWER: f64 = 1e-4;
pub const VOL_UPPER: f64 = 5.0;

/// Inputs shared by pricing and inversion. `time` is in years, rates continuous.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BsInputs {
    pub spot: f64,
    pub strike: f64,
    pub time: f64,
    pub rate: f64,
    pub dividend_yield: f64,
    pub option_type: OptionType,
}

impl BsInputs {
    fn is_valid(&self) -> bool {
        self.spot.is_finite()
            && self.strike.is_finite()
            && self.time.is_finite()
            && self.rate.is_finite()
            && self.dividend_yield.is_finite()
            && self.spot > 0.0
            && self.strike > 0.0
            && self.time > 0.0
    }

    fn d1_d2(&self, vol: f64) -> (f64, f64) {
        let sqrt_t = self.time.sqrt();
        let d1 = ((self.spot / self.strike).ln()
            + (self.rate - self.dividend_yield + 0.5 * vol * vol) * self.time)
            / (vol * sqrt_t);
        (d1, d1 - vol * sqrt_t)
    }
}

fn norm_cdf(x: f64) -> f64 {
    Normal::standard().cdf(x)
}

fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Black-Scholes price with continuous dividend yield. Requires `vol > 0`.
pub fn bs_price(inputs: &BsInputs, vol: f64) -> f64 {
    let (d1, d2) = inputs.d1_d2(vol);
    let disc_r = (-inputs.rate * inputs.time).exp();
    let disc_q = (-inputs.dividend_yield * inputs.time).exp();
    match inputs.option_type {
        OptionType::Call => {
            inputs.spot * disc_q * norm_cdf(d1) - inputs.strike * disc_r * norm_cdf(d2)
        }
        OptionType::Put => {
            inputs.strike * disc_r * norm_cdf(-d2) - inputs.spot * disc_q * norm_cdf(-d1)
        }
    }
}

/// dPrice/dVol, unscaled.
pub fn bs_vega(inputs: &BsInputs, vol: f64) -> f64 {
    let (d1, _) = inputs.d1_d2(vol);
    inputs.spot * (-inputs.dividend_yield * inputs.time).exp() * norm_pdf(d1) * inputs.time.sqrt()
}

/// Annualised volatility reproducing `price`, or `None` when no volatility in
/// [`VOL_LOWER`, `VOL_UPPER`] brackets it.
pub fn implied_vol(
    price: f64,
    spot: f64,
    strike: f64,
    time_years: f64,
    rate: f64,
    dividend_yield: f64,
    option_type: OptionType,
) -> Option<f64> {
    let inputs = BsInputs {
        spot,
        strike,
        time: time_years,
        rate,
        dividend_yield,
        option_type,
    };
    if !inputs.is_valid() || !price.is_finite() || price <= 0.0 {
        return None;
    }

    newton(&inputs, price).or_else(|| bisect(&inputs, price))
}

fn newton(inputs: &BsInputs, price: f64) -> Option<f64> {
    let mut vol = INITIAL_GUESS;
    for _ in 0..MAX_ITERATIONS {
        let diff = bs_price(inputs, vol) - price;
        if diff.abs() < PRICE_TOLERANCE {
            return Some(vol);
        }
        let vega = bs_vega(inputs, vol);
        if !(vega >= MIN_VEGA) {
            return None;
        }
        vol -= diff / vega;
        if !(vol > 0.0 && vol <= VOL_UPPER) {
            return None;
        }
    }
    None
}

fn bisect(inputs: &BsInputs, price: f64) -> Option<f64> {
    let (mut lo, mut hi) = (VOL_LOWER, VOL_UPPER);
    let mut f_lo = bs_price(inputs, lo) - price;
    let f_hi = bs_price(inputs, hi) - price;
    if !(f_lo * f_hi <= 0.0) {
        return None;
    }

    for _ in 0..MAX_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        let f_mid = bs_price(inputs, mid) - price;
        if f_mid.abs() < PRICE_TOLERANCE {
            return Some(mid);
        }
        if f_lo * f_mid <= 0.0 {
            hi = mid;
        } else {
            lo = mid;
            f_lo = f_mid;
        }
    }
    Some(0.5 * (lo + hi))
}
