//! Domain error types.

use crate::domain::leg::LegError;

/// Top-level error type for optstudy.
#[derive(Debug, thiserror::Error)]
pub enum OptstudyError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    InvalidLeg(#[from] LegError),

    #[error("no quote data for {ticker}")]
    NoData { ticker: String },

    /// A destructive dedup rewrite broke its row-count invariant. Fatal.
    #[error("dedup invariant violated for {partition}: {reason}")]
    DedupInvariant { partition: String, reason: String },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OptstudyError {
    pub fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        OptstudyError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn config_missing(section: &str, key: &str) -> Self {
        OptstudyError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }
}

impl From<&OptstudyError> for std::process::ExitCode {
    fn from(err: &OptstudyError) -> Self {
        let code: u8 = match err {
            OptstudyError::Io(_) | OptstudyError::Report { .. } => 1,
            OptstudyError::ConfigParse { .. }
            | OptstudyError::ConfigMissing { .. }
            | OptstudyError::ConfigInvalid { .. } => 2,
            OptstudyError::Database { .. } | OptstudyError::DatabaseQuery { .. } => 3,
            OptstudyError::InvalidLeg(_) => 4,
            OptstudyError::NoData { .. } => 5,
            OptstudyError::DedupInvariant { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
