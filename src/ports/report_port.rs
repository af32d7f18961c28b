//! Report output port.

use std::path::PathBuf;

use crate::domain::error::OptstudyError;
use crate::domain::study::StudyResult;

/// Files written for one study.
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenReport {
    pub detail: PathBuf,
    pub summary: PathBuf,
}

pub trait ReportPort {
    /// Writes per-outcome detail and per-ticker/pooled summaries.
    fn write_study(&self, result: &StudyResult) -> Result<WrittenReport, OptstudyError>;
}
