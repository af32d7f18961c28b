//! Port traits: the only way the domain reaches quote data, configuration
//! and report sinks.

pub mod config_port;
pub mod quote_port;
pub mod report_port;
