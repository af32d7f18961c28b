//! Strategy composition: an ordered bundle of legs.
//!
//! No structural constraint is enforced here. Shape (condor, strangle, ...)
//! is recognised later from the legs actually valued together.

use crate::domain::leg::{Direction, Leg, LegError};
use crate::domain::quote::OptionType;

#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub name: String,
    pub legs: Vec<Leg>,
}

impl Strategy {
    pub fn new(name: impl Into<String>, legs: Vec<Leg>) -> Self {
        Self {
            name: name.into(),
            legs,
        }
    }

    /// Legs separated by ',' or ';', each `"DIRECTION TYPE QTY DELTA DTE"`.
    ///
    /// INI readers may treat ';' as a comment marker, so config files use ','.
    pub fn parse_legs(name: impl Into<String>, input: &str) -> Result<Self, LegError> {
        let legs = input
            .split([',', ';'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Leg::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(name, legs))
    }

    /// Short call and put at `shoulder` delta, long wings at `wing` delta.
    pub fn iron_condor(shoulder: f64, wing: f64, dte: i64) -> Result<Self, LegError> {
        Ok(Self::new(
            format!("{shoulder}-{wing} iron condor"),
            vec![
                Leg::new(Direction::Sell, OptionType::Call, 1, shoulder, dte)?,
                Leg::new(Direction::Sell, OptionType::Put, 1, shoulder, dte)?,
                Leg::new(Direction::Buy, OptionType::Call, 1, wing, dte)?,
                Leg::new(Direction::Buy, OptionType::Put, 1, wing, dte)?,
            ],
        ))
    }

    pub fn short_strangle(call_delta: f64, put_delta: f64, dte: i64) -> Result<Self, LegError> {
        Ok(Self::new(
            format!("{call_delta}-{put_delta} strangle"),
            vec![
                Leg::new(Direction::Sell, OptionType::Call, 1, call_delta, dte)?,
                Leg::new(Direction::Sell, OptionType::Put, 1, put_delta, dte)?,
            ],
        ))
    }

    pub fn short_straddle(dte: i64) -> Result<Self, LegError> {
        let mut strategy = Self::short_strangle(50.0, 50.0, dte)?;
        strategy.name = "straddle".to_string();
        Ok(strategy)
    }

    /// Credit vertical: sell `short_delta`, buy the further-OTM `long_delta`.
    pub fn credit_vertical(
        option_type: OptionType,
        short_delta: f64,
        long_delta: f64,
        dte: i64,
    ) -> Result<Self, LegError> {
        Ok(Self::new(
            format!("{short_delta}-{long_delta} {} spread", option_type.to_string().to_lowercase()),
            vec![
                Leg::new(Direction::Sell, option_type, 1, short_delta, dte)?,
                Leg::new(Direction::Buy, option_type, 1, long_delta, dte)?,
            ],
        ))
    }

    pub fn leg_count(&self) -> usize {
        self.legs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iron_condor_has_four_legs() {
        let s = Strategy::iron_condor(25.0, 5.0, 30).unwrap();
        assert_eq!(s.leg_count(), 4);
        assert_eq!(s.legs.iter().filter(|l| l.is_short()).count(), 2);
        assert_eq!(s.legs.iter().filter(|l| l.is_long()).count(), 2);
        assert!(s.legs.iter().all(|l| l.dte() == 30));
    }

    #[test]
    fn straddle_is_two_fifty_delta_shorts() {
        let s = Strategy::short_straddle(30).unwrap();
        assert_eq!(s.name, "straddle");
        assert!(s.legs.iter().all(|l| l.is_short() && l.strike_delta() == 50.0));
    }

    #[test]
    fn credit_vertical_name_and_legs() {
        let s = Strategy::credit_vertical(OptionType::Put, 50.0, 15.0, 30).unwrap();
        assert_eq!(s.name, "50-15 put spread");
        assert!(s.legs[0].is_short());
        assert!(s.legs[1].is_long());
    }

    #[test]
    fn parse_legs_from_config_string() {
        let s = Strategy::parse_legs("strangle", "SELL CALL 1 25 30; SELL PUT 1 25 30;").unwrap();
        assert_eq!(s.leg_count(), 2);
        assert_eq!(s.legs[1].option_type(), OptionType::Put);
    }

    #[test]
    fn parse_legs_propagates_leg_errors() {
        let err = Strategy::parse_legs("bad", "SELL CALL 0 25 30").unwrap_err();
        assert_eq!(err, LegError::NonPositiveQuantity(0));
    }

    #[test]
    fn invalid_preset_fails_immediately() {
        assert!(Strategy::iron_condor(25.0, 0.0, 30).is_err());
        assert!(Strategy::short_strangle(25.0, 25.0, 0).is_err());
    }
}
