use std::fmt;

use serde::Serialize;

/// Diagnostics for a component that behaved differently on re-execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlakyReport {
    /// The accepted component that now diverges.
    pub subsequence: String,
    /// The candidate that embedded it.
    pub candidate: String,
    /// Position of the diverging statement inside the candidate.
    pub statement: usize,
    /// What that statement did this time.
    pub outcome: String,
    /// Candidates executed since the component was accepted, oldest first.
    /// Present only when diagnostics are on.
    pub history: Option<Vec<String>>,
}

impl fmt::Display for FlakyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "statement {} ({}) diverged from its accepted run\n-- component --\n{}\n-- candidate --\n{}",
            self.statement, self.outcome, self.subsequence, self.candidate
        )?;
        if let Some(history) = &self.history {
            write!(f, "\n-- {} candidates executed since --", history.len())?;
            for code in history {
                write!(f, "\n{code}\n")?;
            }
        }
        Ok(())
    }
}
