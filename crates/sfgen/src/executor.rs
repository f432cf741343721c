use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{trace, warn};

use crate::error::EngineError;
use crate::operation::{ApplyError, OpRef, Thrown, PANIC};
use crate::value::Value;

/// Result of running one statement.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Normal { value: Value, duration: Duration },
    Exceptional { thrown: Thrown, duration: Duration },
    TimedOut,
}

impl ExecutionOutcome {
    pub fn is_normal(&self) -> bool {
        matches!(self, ExecutionOutcome::Normal { .. })
    }
}

/// Running totals of completed executions. Timeouts are counted but never
/// enter the averages.
#[derive(Debug, Clone, Default)]
pub struct ExecStats {
    pub normal_count: u64,
    pub normal_time: Duration,
    pub exceptional_count: u64,
    pub exceptional_time: Duration,
    pub timeouts: u64,
    /// Workers left running after a timeout.
    pub abandoned_workers: u64,
}

impl ExecStats {
    pub fn avg_normal_ms(&self) -> f64 {
        average_ms(self.normal_time, self.normal_count)
    }

    pub fn avg_exceptional_ms(&self) -> f64 {
        average_ms(self.exceptional_time, self.exceptional_count)
    }

    pub fn summary(&self) -> ExecSummary {
        ExecSummary {
            normal: self.normal_count,
            normal_avg_ms: self.avg_normal_ms(),
            exceptional: self.exceptional_count,
            exceptional_avg_ms: self.avg_exceptional_ms(),
            timeouts: self.timeouts,
            abandoned_workers: self.abandoned_workers,
        }
    }

    fn record(&mut self, outcome: &ExecutionOutcome) {
        match outcome {
            ExecutionOutcome::Normal { duration, .. } => {
                self.normal_count += 1;
                self.normal_time += *duration;
            }
            ExecutionOutcome::Exceptional { duration, .. } => {
                self.exceptional_count += 1;
                self.exceptional_time += *duration;
            }
            ExecutionOutcome::TimedOut => self.timeouts += 1,
        }
    }
}

fn average_ms(total: Duration, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total.as_secs_f64() * 1000.0 / count as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecSummary {
    pub normal: u64,
    pub normal_avg_ms: f64,
    pub exceptional: u64,
    pub exceptional_avg_ms: f64,
    pub timeouts: u64,
    pub abandoned_workers: u64,
}

type Invocation = (std::thread::Result<Result<Value, ApplyError>>, Duration);

/// Runs operations, either on the caller's thread or on a dedicated worker
/// bounded by a deadline.
///
/// A timed-out worker cannot be stopped; it is detached and keeps running
/// until the call returns on its own.
#[derive(Debug, Default)]
pub struct IsolatedExecutor {
    stats: ExecStats,
}

impl IsolatedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &ExecStats {
        &self.stats
    }

    /// Apply `op` to `inputs`. With a deadline the call runs isolated on a
    /// worker thread; without one it runs inline.
    ///
    /// Failures of the code under test, panics included, come back as
    /// `Exceptional`. Adapter failures are returned as errors.
    pub fn execute(
        &mut self,
        op: &OpRef,
        inputs: Vec<Value>,
        deadline: Option<Duration>,
    ) -> Result<ExecutionOutcome, EngineError> {
        let invocation = match deadline {
            None => Some(invoke(op, &inputs)),
            Some(limit) => self.invoke_isolated(op, inputs, limit)?,
        };
        let outcome = match invocation {
            None => ExecutionOutcome::TimedOut,
            Some((Ok(Ok(value)), duration)) => ExecutionOutcome::Normal { value, duration },
            Some((Ok(Err(ApplyError::Thrown(thrown))), duration)) => {
                ExecutionOutcome::Exceptional { thrown, duration }
            }
            Some((Ok(Err(ApplyError::Adapter(message))), _)) => {
                return Err(EngineError::Adapter {
                    op: op.id().to_string(),
                    message,
                });
            }
            Some((Err(payload), duration)) => ExecutionOutcome::Exceptional {
                thrown: Thrown::new(PANIC, panic_message(&payload)),
                duration,
            },
        };
        trace!(op = op.id(), normal = outcome.is_normal(), "executed");
        self.stats.record(&outcome);
        Ok(outcome)
    }

    fn invoke_isolated(
        &mut self,
        op: &OpRef,
        inputs: Vec<Value>,
        limit: Duration,
    ) -> Result<Option<Invocation>, EngineError> {
        let (tx, rx) = mpsc::channel();
        let worker_op = OpRef::clone(op);
        let handle = thread::Builder::new()
            .name("seqforge-exec".to_string())
            .spawn(move || {
                let _ = tx.send(invoke(&worker_op, &inputs));
            })
            .map_err(EngineError::Spawn)?;

        match rx.recv_timeout(limit) {
            Ok(invocation) => {
                let _ = handle.join();
                Ok(Some(invocation))
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(op = op.id(), limit_ms = limit.as_millis() as u64, "call timed out, abandoning worker");
                self.stats.abandoned_workers += 1;
                Ok(None)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                // The worker catches panics, so it only vanishes if sending failed.
                let _ = handle.join();
                Err(EngineError::Adapter {
                    op: op.id().to_string(),
                    message: "execution worker exited without a result".into(),
                })
            }
        }
    }
}

fn invoke(op: &OpRef, inputs: &[Value]) -> Invocation {
    let start = Instant::now();
    let result = catch_unwind(AssertUnwindSafe(|| op.invoke(inputs)));
    (result, start.elapsed())
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod executor_tests {
    use super::*;
    use std::sync::Arc;

    use crate::operation::Operation;
    use crate::types::TypeDesc;

    fn boom(_: &[Value]) -> Result<Value, ApplyError> {
        panic!("boom")
    }

    fn sleepy(_: &[Value]) -> Result<Value, ApplyError> {
        thread::sleep(Duration::from_millis(500));
        Ok(Value::Unit)
    }

    fn fails(_: &[Value]) -> Result<Value, ApplyError> {
        Err(ApplyError::thrown("illegal_state", "nope"))
    }

    fn broken(_: &[Value]) -> Result<Value, ApplyError> {
        Err(ApplyError::Adapter("reflection failed".into()))
    }

    #[test]
    fn test_panic_becomes_exceptional() {
        let op: OpRef = Arc::new(Operation::function("boom", vec![], TypeDesc::void(), boom));
        let mut ex = IsolatedExecutor::new();
        match ex.execute(&op, vec![], None).unwrap() {
            ExecutionOutcome::Exceptional { thrown, .. } => {
                assert_eq!(thrown.kind, PANIC);
                assert_eq!(thrown.message, "boom");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ex.stats().exceptional_count, 1);
    }

    #[test]
    fn test_timeout_is_counted_but_not_averaged() {
        let op: OpRef = Arc::new(Operation::function("sleepy", vec![], TypeDesc::void(), sleepy));
        let mut ex = IsolatedExecutor::new();
        let outcome = ex.execute(&op, vec![], Some(Duration::from_millis(20))).unwrap();
        assert!(matches!(outcome, ExecutionOutcome::TimedOut));
        let stats = ex.stats();
        assert_eq!((stats.timeouts, stats.abandoned_workers), (1, 1));
        assert_eq!(stats.normal_count + stats.exceptional_count, 0);
        assert_eq!(stats.avg_normal_ms(), 0.0);
    }

    #[test]
    fn test_thrown_and_adapter_failures() {
        let thrown: OpRef = Arc::new(Operation::function("fails", vec![], TypeDesc::void(), fails));
        let adapter: OpRef = Arc::new(Operation::function("broken", vec![], TypeDesc::void(), broken));
        let mut ex = IsolatedExecutor::new();
        let outcome = ex.execute(&thrown, vec![], Some(Duration::from_secs(5))).unwrap();
        assert!(matches!(outcome, ExecutionOutcome::Exceptional { .. }));
        assert!(matches!(
            ex.execute(&adapter, vec![], None),
            Err(EngineError::Adapter { .. })
        ));
    }

    #[test]
    fn test_null_receiver_is_exceptional() {
        let ty = TypeDesc::reference("Counter");
        let op: OpRef = Arc::new(Operation::method(&ty, "value", vec![], TypeDesc::int(), fails));
        let mut ex = IsolatedExecutor::new();
        match ex.execute(&op, vec![Value::Null], None).unwrap() {
            ExecutionOutcome::Exceptional { thrown, .. } => {
                assert_eq!(thrown.kind, crate::operation::NULL_RECEIVER)
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
