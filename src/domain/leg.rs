//! Strategy legs in trader language.
//!
//! A [`Leg`] says "sell 1 25-delta call at 30 DTE". The concrete strike and
//! expiry are only known once a resolver has matched the leg against a day's
//! quotes; resolution produces a new `Leg` via [`Leg::with_resolution`] and
//! never mutates the original.

use chrono::NaiveDate;

use crate::domain::quote::OptionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    /// +1 for bought legs, -1 for sold legs.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Buy => 1.0,
            Direction::Sell => -1.0,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "BUY" | "B" | "LONG" => Some(Direction::Buy),
            "SELL" | "S" | "SHORT" => Some(Direction::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LegError {
    #[error("quantity must be a positive integer, got {0}")]
    NonPositiveQuantity(i64),

    #[error("quantity {0} exceeds the maximum of {max}", max = u32::MAX)]
    QuantityTooLarge(i64),

    #[error("strike delta must be in (0, 100], got {0}")]
    DeltaOutOfRange(f64),

    #[error("target DTE must be >= 1, got {0}")]
    DteTooShort(i64),

    #[error("cannot parse leg '{input}': {reason}")]
    Unparseable { input: String, reason: String },
}

/// Concrete contract a leg was matched to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub strike: f64,
    pub expiry: NaiveDate,
    /// Per-share premium at entry.
    pub entry_price: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    direction: Direction,
    option_type: OptionType,
    quantity: u32,
    strike_delta: f64,
    dte: u32,
    resolution: Option<Resolution>,
}

impl Leg {
    /// Validates the trader-language targets. Nothing is clamped.
    pub fn new(
        direction: Direction,
        option_type: OptionType,
        quantity: i64,
        strike_delta: f64,
        dte: i64,
    ) -> Result<Self, LegError> {
        if quantity <= 0 {
            return Err(LegError::NonPositiveQuantity(quantity));
        }
        if quantity > i64::from(u32::MAX) {
            return Err(LegError::QuantityTooLarge(quantity));
        }
        if !(strike_delta > 0.0 && strike_delta <= 100.0) {
            return Err(LegError::DeltaOutOfRange(strike_delta));
        }
        if dte < 1 || dte > u32::MAX as i64 {
            return Err(LegError::DteTooShort(dte));
        }
        Ok(Self {
            direction,
            option_type,
            quantity: quantity as u32,
            strike_delta,
            dte: dte as u32,
            resolution: None,
        })
    }

    /// Parses `"SELL CALL 1 25 30"`: direction, type, quantity, delta, DTE.
    pub fn parse(input: &str) -> Result<Self, LegError> {
        let unparseable = |reason: &str| LegError::Unparseable {
            input: input.trim().to_string(),
            reason: reason.to_string(),
        };

        let tokens: Vec<&str> = input.split_whitespace().collect();
        if tokens.len() != 5 {
            return Err(unparseable(
                "expected 5 fields: direction type quantity delta dte",
            ));
        }
        let direction = Direction::parse(tokens[0]).ok_or_else(|| unparseable("bad direction"))?;
        let option_type =
            OptionType::parse(tokens[1]).ok_or_else(|| unparseable("bad option type"))?;
        let quantity: i64 = tokens[2]
            .parse()
            .map_err(|_| unparseable("quantity is not an integer"))?;
        let strike_delta: f64 = tokens[3]
            .parse()
            .map_err(|_| unparseable("delta is not a number"))?;
        let dte: i64 = tokens[4]
            .parse()
            .map_err(|_| unparseable("dte is not an integer"))?;

        Leg::new(direction, option_type, quantity, strike_delta, dte)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn option_type(&self) -> OptionType {
        self.option_type
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Delta in trader units, e.g. 25.0 for a 25-delta leg.
    pub fn strike_delta(&self) -> f64 {
        self.strike_delta
    }

    pub fn dte(&self) -> u32 {
        self.dte
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    pub fn is_long(&self) -> bool {
        self.direction == Direction::Buy
    }

    pub fn is_short(&self) -> bool {
        self.direction == Direction::Sell
    }

    /// Signed delta the resolver aims for: calls +d/100, puts -d/100.
    pub fn delta_target(&self) -> f64 {
        let magnitude = self.strike_delta / 100.0;
        match self.option_type {
            OptionType::Call => magnitude,
            OptionType::Put => -magnitude,
        }
    }

    pub fn with_resolution(&self, strike: f64, expiry: NaiveDate, entry_price: f64) -> Leg {
        Leg {
            resolution: Some(Resolution {
                strike,
                expiry,
                entry_price,
            }),
            ..self.clone()
        }
    }
}

impl std::fmt::Display for Leg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.direction, self.option_type, self.quantity, self.strike_delta, self.dte
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_call() -> Leg {
        Leg::new(Direction::Sell, OptionType::Call, 1, 25.0, 30).unwrap()
    }

    #[test]
    fn rejects_non_positive_quantity() {
        assert_eq!(
            Leg::new(Direction::Buy, OptionType::Call, 0, 25.0, 30),
            Err(LegError::NonPositiveQuantity(0))
        );
        assert!(Leg::new(Direction::Buy, OptionType::Call, -2, 25.0, 30).is_err());
    }

    #[test]
    fn rejects_quantity_beyond_contract_limit() {
        let too_many = i64::from(u32::MAX) + 1;
        let err = Leg::new(Direction::Sell, OptionType::Put, too_many, 25.0, 30).unwrap_err();
        assert_eq!(err, LegError::QuantityTooLarge(too_many));
        assert_eq!(
            err.to_string(),
            format!("quantity {too_many} exceeds the maximum of {}", u32::MAX)
        );
        assert!(Leg::new(Direction::Sell, OptionType::Put, i64::from(u32::MAX), 25.0, 30).is_ok());
    }

    #[test]
    fn rejects_delta_outside_range() {
        assert!(Leg::new(Direction::Buy, OptionType::Put, 1, 0.0, 30).is_err());
        assert!(Leg::new(Direction::Buy, OptionType::Put, 1, 100.5, 30).is_err());
        assert!(Leg::new(Direction::Buy, OptionType::Put, 1, f64::NAN, 30).is_err());
        assert!(Leg::new(Direction::Buy, OptionType::Put, 1, 100.0, 30).is_ok());
    }

    #[test]
    fn rejects_short_dte() {
        assert_eq!(
            Leg::new(Direction::Sell, OptionType::Put, 1, 25.0, 0),
            Err(LegError::DteTooShort(0))
        );
        assert!(Leg::new(Direction::Sell, OptionType::Put, 1, 25.0, 1).is_ok());
    }

    #[test]
    fn delta_target_sign_follows_type() {
        assert!((short_call().delta_target() - 0.25).abs() < 1e-12);
        let put = Leg::new(Direction::Sell, OptionType::Put, 1, 25.0, 30).unwrap();
        assert!((put.delta_target() + 0.25).abs() < 1e-12);
    }

    #[test]
    fn resolution_returns_new_value() {
        let leg = short_call();
        let expiry = NaiveDate::from_ymd_opt(2024, 2, 16).unwrap();
        let resolved = leg.with_resolution(105.0, expiry, 1.25);

        assert!(leg.resolution().is_none());
        let r = resolved.resolution().unwrap();
        assert_eq!(r.strike, 105.0);
        assert_eq!(r.expiry, expiry);
        assert_eq!(resolved.strike_delta(), leg.strike_delta());
    }

    #[test]
    fn parse_leg_text() {
        let leg = Leg::parse("sell put 2 16 45").unwrap();
        assert!(leg.is_short());
        assert_eq!(leg.option_type(), OptionType::Put);
        assert_eq!(leg.quantity(), 2);
        assert_eq!(leg.strike_delta(), 16.0);
        assert_eq!(leg.dte(), 45);
    }

    #[test]
    fn parse_leg_rejects_garbage() {
        assert!(matches!(
            Leg::parse("SELL CALL 1 25"),
            Err(LegError::Unparseable { .. })
        ));
        assert!(matches!(
            Leg::parse("HOLD CALL 1 25 30"),
            Err(LegError::Unparseable { .. })
        ));
        assert_eq!(
            Leg::parse("BUY CALL 1 25 0"),
            Err(LegError::DteTooShort(0))
        );
    }

    #[test]
    fn display_round_trips_through_parse() {
        let leg = short_call();
        assert_eq!(Leg::parse(&leg.to_string()).unwrap(), leg);
    }
}
