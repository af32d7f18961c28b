//! Core domain types and logic.

pub mod quote;
pub mod dedup;
pub mod implied_vol;
pub mod leg;
pub mod strategy;
pub mod leg_resolver;
pub mod strategy_resolver;
pub mod margin;
pub mod valuation;
pub mod metrics;
pub mod study;
pub mod universe;
pub mod config_validation;
pub mod error;
