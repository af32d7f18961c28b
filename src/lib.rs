//! optstudy: multi-leg option strategy backtester.
//!
//! Resolves delta/DTE leg targets against historical option quotes, values
//! each entry to expiry under mid and worst-case pricing, and reports return
//! on capital per strategy shape.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
