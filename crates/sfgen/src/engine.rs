use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace};

use seqforge_util::{CheckpointMultiMap, CheckpointSet, RandomSource};

use crate::catalog::Catalog;
use crate::classify::{BehaviorClassifier, Classification, KindClassifier};
use crate::config::GenConfig;
use crate::error::EngineError;
use crate::executor::{ExecStats, ExecutionOutcome, IsolatedExecutor};
use crate::flaky::FlakyReport;
use crate::monitor::{MonitorState, ProgressMonitor, StallAction};
use crate::operation::OpRef;
use crate::pool::{ComponentPool, MatchMode};
use crate::report::{DiscardCounts, GenerationReport, StopReason};
use crate::sequence::Sequence;
use crate::sink::{AcceptedSequence, MemorySink, SequenceSink};
use crate::types::{ExactTypes, TypeDesc, TypeOracle};
use crate::value::{Literal, Value};

/// Why a candidate never reached execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    Duplicate,
    TooLarge,
}

/// What one generation step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// No input assignment was found for the chosen operation.
    Skipped,
    Discarded(DiscardReason),
    Executed(Classification),
}

#[derive(Debug, Clone, Default)]
struct Counters {
    steps: u64,
    skipped: u64,
    generated: u64,
    outputs: u64,
    discarded: DiscardCounts,
    classifications: BTreeMap<Classification, u64>,
}

struct InputSelection {
    sequences: Vec<Sequence>,
    /// Absolute positions in the concatenation of `sequences`.
    positions: Vec<usize>,
}

struct CandidateRun {
    outcome: ExecutionOutcome,
    /// Value of every statement that completed normally, by position.
    values: Vec<Value>,
    /// Primitive values returned by calls.
    literals: Vec<Literal>,
}

/// The feedback-directed generation loop.
///
/// Each step picks an operation, assembles inputs from pooled components,
/// executes the resulting candidate and feeds useful results back into the
/// pool. Every random decision comes from one seeded [`RandomSource`], so a
/// session is reproducible for a fixed seed and deterministic adapters.
pub struct GenerationEngine {
    config: GenConfig,
    catalog: Catalog,
    /// Operations still eligible for selection.
    active: Vec<OpRef>,
    oracle: Arc<dyn TypeOracle>,
    classifier: Box<dyn BehaviorClassifier>,
    pool: ComponentPool,
    executor: IsolatedExecutor,
    rng: RandomSource,
    sink: Box<dyn SequenceSink>,
    /// Fingerprints of every candidate run so far, minus rolled-back ones.
    seen: CheckpointSet<u64>,
    /// Components used as inputs of a longer regression.
    subsumed: BTreeSet<u64>,
    regressions: Vec<Sequence>,
    counters: Counters,
    monitor: Arc<MonitorState>,
    stall_action: Option<StallAction>,
    /// (fingerprint, code) of executed candidates; kept only with diagnostics.
    history: Vec<(u64, String)>,
    started: Option<Instant>,
}

impl GenerationEngine {
    pub fn new(catalog: Catalog, config: GenConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let oracle: Arc<dyn TypeOracle> = Arc::new(ExactTypes);
        let pool = ComponentPool::new(Arc::clone(&oracle), config.clear_threshold, config.favor_shorter)?;
        Ok(GenerationEngine {
            active: catalog.ops().to_vec(),
            classifier: Box::new(KindClassifier::new(config.behavior.clone())),
            rng: RandomSource::new(config.seed),
            catalog,
            oracle,
            pool,
            executor: IsolatedExecutor::new(),
            sink: Box::new(MemorySink::new()),
            seen: CheckpointSet::new(),
            subsumed: BTreeSet::new(),
            regressions: Vec::new(),
            counters: Counters::default(),
            monitor: MonitorState::new(),
            stall_action: None,
            history: Vec::new(),
            started: None,
            config,
        })
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn TypeOracle>) -> Self {
        self.pool.set_oracle(Arc::clone(&oracle));
        self.oracle = oracle;
        self
    }

    pub fn with_classifier(mut self, classifier: Box<dyn BehaviorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn SequenceSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Add components that survive pool resets, such as a loaded cache.
    pub fn with_seeds(mut self, seeds: Vec<Sequence>) -> Result<Self, EngineError> {
        for seed in seeds {
            self.pool.add_seed(seed)?;
        }
        Ok(self)
    }

    /// Action taken by the watchdog of `run`. Defaults to aborting.
    pub fn with_stall_action(mut self, action: StallAction) -> Self {
        self.stall_action = Some(action);
        self
    }

    /// Log every random decision at trace level.
    pub fn with_random_trace(mut self, on: bool) -> Self {
        self.rng.set_verbose(on);
        self
    }

    pub fn config(&self) -> &GenConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn pool(&self) -> &ComponentPool {
        &self.pool
    }

    pub fn executor_stats(&self) -> &ExecStats {
        self.executor.stats()
    }

    pub fn monitor_state(&self) -> Arc<MonitorState> {
        Arc::clone(&self.monitor)
    }

    /// Regression outputs not extended by a later regression.
    pub fn regression_outputs(&self) -> Vec<Sequence> {
        self.regressions
            .iter()
            .filter(|s| !self.subsumed.contains(&s.fingerprint()))
            .cloned()
            .collect()
    }

    /// Run steps until a stop criterion holds.
    pub fn run(&mut self) -> Result<GenerationReport, EngineError> {
        let started = *self.started.get_or_insert_with(Instant::now);
        info!(
            seed = self.config.seed,
            operations = self.catalog.len(),
            max_size = self.config.max_size,
            isolated = self.config.call_timeout_ms.is_some(),
            "generation started"
        );
        let monitor = ProgressMonitor::start(
            Arc::clone(&self.monitor),
            Duration::from_millis(self.config.progress_interval_ms),
            Duration::from_millis(self.config.stall_window_ms),
            self.stall_action.take().unwrap_or(StallAction::Abort),
        )?;
        let stop = loop {
            if let Some(reason) = self.stop_reason() {
                break reason;
            }
            self.step()?;
        };
        self.sink.flush()?;
        monitor.stop();
        let report = self.report(stop, started.elapsed());
        info!(
            stop = ?stop,
            generated = report.generated,
            outputs = report.outputs,
            pool = report.pool_size,
            elapsed_ms = report.elapsed_ms,
            "generation finished"
        );
        Ok(report)
    }

    /// The first stop criterion that holds, if any.
    pub fn stop_reason(&self) -> Option<StopReason> {
        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        if elapsed >= self.config.time_limit() {
            Some(StopReason::TimeLimit)
        } else if self.counters.generated >= self.config.input_limit {
            Some(StopReason::InputLimit)
        } else if self.counters.outputs >= self.config.output_limit {
            Some(StopReason::OutputLimit)
        } else if self.active.is_empty() {
            Some(StopReason::NoOperations)
        } else {
            None
        }
    }

    pub fn report(&self, stop: StopReason, elapsed: Duration) -> GenerationReport {
        GenerationReport {
            steps: self.counters.steps,
            skipped: self.counters.skipped,
            generated: self.counters.generated,
            outputs: self.counters.outputs,
            discarded: self.counters.discarded.clone(),
            classifications: self
                .counters
                .classifications
                .iter()
                .map(|(c, n)| (c.as_str().to_string(), *n))
                .collect(),
            non_subsumed_regressions: self.regression_outputs().len(),
            executor: self.executor.stats().summary(),
            pool_size: self.pool.size(),
            pool_resets: self.pool.resets(),
            seed_components: self.pool.seed_count(),
            elapsed_ms: elapsed.as_millis() as u64,
            stop_reason: stop,
        }
    }

    /// One round: select, combine, extend, execute, classify, retain.
    pub fn step(&mut self) -> Result<StepResult, EngineError> {
        self.started.get_or_insert_with(Instant::now);
        self.counters.steps += 1;
        let Some(op) = self.rng.choose(&self.active).cloned() else {
            self.counters.skipped += 1;
            return Ok(StepResult::Skipped);
        };
        if op.arity() == 0 {
            // Every later use would be a duplicate.
            self.active.retain(|o| !Arc::ptr_eq(o, &op));
        }
        let result = self.step_with(&op)?;
        trace!(op = op.id(), result = ?result, "step");
        self.monitor.record(
            self.counters.steps,
            self.counters.generated,
            self.counters.outputs,
            self.pool.size(),
            self.executor.stats().abandoned_workers,
        );
        Ok(result)
    }

    fn step_with(&mut self, op: &OpRef) -> Result<StepResult, EngineError> {
        let Some(selection) = self.select_inputs(op)? else {
            self.counters.skipped += 1;
            self.counters.discarded.input_selection_failure += 1;
            return Ok(StepResult::Skipped);
        };

        let combined = Sequence::concat(&selection.sequences);
        let candidate = combined.extend(Arc::clone(op), &selection.positions)?;
        if candidate.len() > self.config.max_size {
            self.counters.discarded.too_large += 1;
            debug!(op = op.id(), size = candidate.len(), "candidate too large");
            return Ok(StepResult::Discarded(DiscardReason::TooLarge));
        }

        self.counters.generated += 1;
        let fingerprint = candidate.fingerprint();
        if self.seen.contains(&fingerprint) {
            self.counters.discarded.duplicate += 1;
            return Ok(StepResult::Discarded(DiscardReason::Duplicate));
        }
        self.seen.mark();
        self.seen.add(fingerprint)?;

        let code = candidate.to_code();
        self.monitor.publish_candidate(&code);
        if self.config.diagnostics {
            self.history.push((fingerprint, code));
        }

        let run = self.execute_candidate(&candidate)?;
        let class = Classification::of(&run.outcome, self.classifier.as_ref());
        *self.counters.classifications.entry(class).or_default() += 1;

        if !class.is_output() {
            self.seen.undo_to_last_mark()?;
            if class == Classification::Invalid {
                self.counters.discarded.invalid += 1;
            } else {
                self.counters.discarded.timed_out += 1;
            }
            debug!(op = op.id(), class = class.as_str(), "candidate discarded");
            return Ok(StepResult::Executed(class));
        }
        self.seen.commit()?;

        if class.enters_pool() {
            for input in &selection.sequences {
                self.subsumed.insert(input.fingerprint());
            }
            let nulls: Vec<usize> = candidate
                .last_statement_positions()
                .into_iter()
                .filter(|&p| run.values.get(p).is_some_and(Value::is_null))
                .collect();
            if !self.pool.add(candidate.clone().with_inactive(nulls))? {
                debug!(op = op.id(), "regression has no reusable value");
            }
            for lit in run.literals {
                self.pool.add_literal(lit)?;
            }
            self.regressions.push(candidate.clone());
        }

        let accepted = AcceptedSequence {
            index: self.counters.outputs,
            classification: class,
            sequence: candidate,
        };
        self.sink.accept(&accepted)?;
        self.counters.outputs += 1;
        debug!(op = op.id(), class = class.as_str(), index = accepted.index, "output accepted");
        Ok(StepResult::Executed(class))
    }

    /// Choose a component and a variable for every input of `op`, or
    /// nothing if some input cannot be satisfied.
    fn select_inputs(&mut self, op: &OpRef) -> Result<Option<InputSelection>, EngineError> {
        let mut sequences: Vec<Sequence> = Vec::with_capacity(op.arity());
        let mut positions = Vec::with_capacity(op.arity());
        let mut total = 0usize;
        let mut aliases: CheckpointMultiMap<TypeDesc, usize> = CheckpointMultiMap::new();

        for (i, ty) in op.inputs().iter().enumerate() {
            let is_receiver = op.is_receiver(i);

            if !is_receiver
                && self.config.alias_ratio > 0.0
                && self.rng.weighted_coin_flip(self.config.alias_ratio)
            {
                let reusable: Vec<usize> = aliases
                    .entries()
                    .filter(|(t, _)| self.oracle.is_assignable(ty, t))
                    .map(|(_, &pos)| pos)
                    .collect();
                if let Some(&pos) = self.rng.choose(&reusable) {
                    positions.push(pos);
                    continue;
                }
            }

            let null_allowed = ty.is_reference() && !is_receiver && !self.config.forbid_null;
            let use_null = null_allowed
                && self.config.null_ratio > 0.0
                && self.rng.weighted_coin_flip(self.config.null_ratio);
            let chosen = if use_null {
                None
            } else {
                self.pool.select(ty, MatchMode::Assignable, &mut self.rng)?
            };

            let Some(seq) = chosen else {
                if !null_allowed {
                    trace!(op = op.id(), input = i, ty = %ty, "no component for input");
                    return Ok(None);
                }
                positions.push(total);
                total += 1;
                sequences.push(Sequence::null_of(ty));
                continue;
            };

            aliases.mark();
            for (pos, stmt) in seq.statements().iter().enumerate() {
                if seq.is_active(pos) && !stmt.output().is_void() && !stmt.is_null() {
                    aliases.add(stmt.output().clone(), total + pos)?;
                }
            }
            let compatible: Vec<usize> = seq
                .last_statement_positions()
                .into_iter()
                .filter(|&p| {
                    seq.is_active(p)
                        && seq.statement(p).is_some_and(|s| {
                            !s.is_null() && !s.output().is_void() && self.oracle.is_assignable(ty, s.output())
                        })
                })
                .collect();
            let Some(&pos) = self.rng.choose(&compatible) else {
                aliases.undo_to_last_mark()?;
                trace!(op = op.id(), input = i, "component has no usable variable");
                return Ok(None);
            };
            aliases.commit()?;
            positions.push(total + pos);
            total += seq.len();
            sequences.push(seq);
        }

        Ok(Some(InputSelection { sequences, positions }))
    }

    /// Re-run every statement of `candidate` in order.
    ///
    /// All statements but the last belong to components that already ran
    /// normally; any other outcome for them means the code under test is not
    /// deterministic, which stops the session.
    fn execute_candidate(&mut self, candidate: &Sequence) -> Result<CandidateRun, EngineError> {
        let n = candidate.len();
        let deadline = self.config.call_timeout();
        let mut values: Vec<Value> = Vec::with_capacity(n);
        let mut literals = Vec::new();

        for (i, stmt) in candidate.statements().iter().enumerate() {
            let op = stmt.op();
            let outcome = if op.is_call() {
                let inputs = stmt.relative_inputs().iter().map(|d| values[i - d].clone()).collect();
                self.executor.execute(op, inputs, deadline)?
            } else {
                let value = op.invoke(&[]).map_err(|e| EngineError::Adapter {
                    op: op.id().to_string(),
                    message: e.to_string(),
                })?;
                ExecutionOutcome::Normal {
                    value,
                    duration: Duration::ZERO,
                }
            };

            let is_last = i + 1 == n;
            if !outcome.is_normal() {
                if is_last {
                    return Ok(CandidateRun {
                        outcome,
                        values,
                        literals,
                    });
                }
                return Err(self.flaky_divergence(candidate, i, &outcome));
            }
            if let ExecutionOutcome::Normal { value, .. } = &outcome {
                if op.is_call() {
                    literals.extend(value.to_literal());
                }
                values.push(value.clone());
            }
            if is_last {
                return Ok(CandidateRun {
                    outcome,
                    values,
                    literals,
                });
            }
        }
        Err(EngineError::InvalidSequence("empty candidate".into()))
    }

    fn flaky_divergence(&self, candidate: &Sequence, statement: usize, outcome: &ExecutionOutcome) -> EngineError {
        let outcome = match outcome {
            ExecutionOutcome::Exceptional { thrown, .. } => format!("threw {thrown}"),
            ExecutionOutcome::TimedOut => "timed out".to_string(),
            ExecutionOutcome::Normal { .. } => "normal".to_string(),
        };
        let component = candidate
            .statements()
            .sublist_containing(statement)
            .map(|(fragment, _)| Sequence::from_statements(fragment))
            .unwrap_or_else(|| candidate.clone());
        let history: Option<Vec<String>> = self.config.diagnostics.then(|| {
            let since = self
                .history
                .iter()
                .rposition(|(fp, _)| *fp == component.fingerprint())
                .map_or(0, |i| i + 1);
            self.history[since..].iter().map(|(_, code)| code.clone()).collect()
        });
        error!(statement, outcome = %outcome, "component diverged on re-execution");
        EngineError::Flaky(Box::new(FlakyReport {
            subsequence: component.to_code(),
            candidate: candidate.to_code(),
            statement,
            outcome,
            history,
        }))
    }
}
