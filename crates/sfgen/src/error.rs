use seqforge_util::{CheckpointError, SamplerError};
use thiserror::Error;

use crate::flaky::FlakyReport;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("checkpoint misuse: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("sampler misuse: {0}")]
    Sampler(#[from] SamplerError),

    #[error("operation {op} expects {expected} inputs, got {got}")]
    Arity {
        op: String,
        expected: usize,
        got: usize,
    },

    #[error("malformed sequence: {0}")]
    InvalidSequence(String),

    #[error("adapter failure in {op}: {message}")]
    Adapter { op: String, message: String },

    #[error("cannot start execution worker: {0}")]
    Spawn(std::io::Error),

    #[error("flaky sequence: {0}")]
    Flaky(Box<FlakyReport>),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("component cache: {0}")]
    Cache(String),

    #[error("sink: {0}")]
    Sink(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
