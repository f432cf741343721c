pub mod cache;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod demo;
pub mod engine;
pub mod error;
pub mod executor;
pub mod flaky;
pub mod monitor;
pub mod operation;
pub mod pool;
pub mod report;
pub mod sequence;
pub mod sink;
#[cfg(test)]
mod tests;
pub mod types;
pub mod value;

pub use cache::ComponentCache;
pub use catalog::Catalog;
pub use classify::{Behavior, BehaviorClassifier, Classification, KindClassifier};
pub use config::GenConfig;
pub use engine::{DiscardReason, GenerationEngine, StepResult};
pub use error::EngineError;
pub use executor::{ExecStats, ExecutionOutcome, IsolatedExecutor};
pub use flaky::FlakyReport;
pub use monitor::{MonitorState, ProgressMonitor, StallAction, StallInfo};
pub use operation::{Apply, ApplyError, CallStyle, OpRef, Operation, Thrown};
pub use pool::{ComponentPool, MatchMode};
pub use report::{GenerationReport, StopReason};
pub use sequence::{Sequence, SequenceRecord, Statement, StatementRecord};
pub use sink::{AcceptedSequence, JsonLinesSink, MemorySink, SequenceSink, TeeSink};
pub use types::{ExactTypes, PrimitiveKind, SubtypeTable, TypeDesc, TypeKind, TypeOracle};
pub use value::{Literal, ObjectRef, Value};
