use std::collections::BTreeMap;

use serde::Serialize;

use crate::executor::ExecSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TimeLimit,
    InputLimit,
    OutputLimit,
    /// Every operation was retired from the active catalog.
    NoOperations,
}

/// Candidates dropped without becoming outputs, by reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiscardCounts {
    pub duplicate: u64,
    pub too_large: u64,
    pub invalid: u64,
    pub timed_out: u64,
    pub input_selection_failure: u64,
}

/// Summary of a finished generation session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationReport {
    pub steps: u64,
    /// Rounds in which no input assignment could be found.
    pub skipped: u64,
    /// Candidates that passed the size check.
    pub generated: u64,
    pub outputs: u64,
    pub discarded: DiscardCounts,
    pub classifications: BTreeMap<String, u64>,
    /// Regression outputs not used as an input of a longer regression.
    pub non_subsumed_regressions: usize,
    pub executor: ExecSummary,
    pub pool_size: usize,
    pub pool_resets: u64,
    pub seed_components: usize,
    pub elapsed_ms: u64,
    pub stop_reason: StopReason,
}

impl GenerationReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
