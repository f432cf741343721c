use thiserror::Error;

/// Misuse of a checkpointable collection. Always a bug in the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckpointError {
    #[error("entry already present: {0}")]
    DuplicateEntry(String),

    #[error("entry not present: {0}")]
    MissingEntry(String),

    #[error("undo requested with no outstanding mark")]
    NoMark,
}

/// Rejected weighted-sampler operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SamplerError {
    #[error("weight must be positive and finite, got {0}")]
    InvalidWeight(f64),

    #[error("element already inserted: {0}")]
    DuplicateElement(String),

    #[error("element not found: {0}")]
    UnknownElement(String),
}
