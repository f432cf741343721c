use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{error, info};

use crate::error::EngineError;

/// Process exit code used when the watchdog aborts a stalled session.
pub const WATCHDOG_EXIT_CODE: i32 = 3;

/// Counters shared between the generation loop and the monitor thread.
/// The loop writes, the monitor only reads.
#[derive(Debug, Default)]
pub struct MonitorState {
    steps: AtomicU64,
    generated: AtomicU64,
    accepted: AtomicU64,
    pool_size: AtomicU64,
    abandoned_workers: AtomicU64,
    current: Mutex<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub steps: u64,
    pub generated: u64,
    pub accepted: u64,
    pub pool_size: u64,
    pub abandoned_workers: u64,
    pub current_candidate: String,
}

impl MonitorState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, steps: u64, generated: u64, accepted: u64, pool_size: usize, abandoned_workers: u64) {
        self.steps.store(steps, Ordering::Relaxed);
        self.generated.store(generated, Ordering::Relaxed);
        self.accepted.store(accepted, Ordering::Relaxed);
        self.pool_size.store(pool_size as u64, Ordering::Relaxed);
        self.abandoned_workers.store(abandoned_workers, Ordering::Relaxed);
    }

    /// Set the candidate about to run.
    pub fn publish_candidate(&self, code: &str) {
        let mut current = self.current.lock();
        current.clear();
        current.push_str(code);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            steps: self.steps.load(Ordering::Relaxed),
            generated: self.generated.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            pool_size: self.pool_size.load(Ordering::Relaxed),
            abandoned_workers: self.abandoned_workers.load(Ordering::Relaxed),
            current_candidate: self.current.lock().clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StallInfo {
    pub snapshot: ProgressSnapshot,
    pub stalled_for: Duration,
}

pub type StallCallback = Box<dyn Fn(&StallInfo) + Send>;

/// What the watchdog does when the session stops making progress.
pub enum StallAction {
    /// Log the last candidate and worker state, then exit the process.
    Abort,
    /// Hand the diagnostics to a callback and keep watching.
    Report(StallCallback),
}

/// Background thread that logs progress and watches for stalls.
pub struct ProgressMonitor {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressMonitor {
    /// Start watching `state`. A zero `stall_window` disables the watchdog.
    pub fn start(
        state: Arc<MonitorState>,
        interval: Duration,
        stall_window: Duration,
        action: StallAction,
    ) -> Result<Self, EngineError> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let watchdog = (!stall_window.is_zero()).then_some(stall_window);
        let tick = match watchdog {
            Some(window) => interval.min(window / 4).max(Duration::from_millis(1)),
            None => interval,
        };
        let handle = thread::Builder::new()
            .name("seqforge-monitor".to_string())
            .spawn(move || {
                let mut last_report = Instant::now();
                let mut last_change = Instant::now();
                let mut last_activity = u64::MAX;
                loop {
                    match stop_rx.recv_timeout(tick) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let snap = state.snapshot();
                    let now = Instant::now();
                    if now.duration_since(last_report) >= interval {
                        info!(
                            steps = snap.steps,
                            generated = snap.generated,
                            accepted = snap.accepted,
                            pool = snap.pool_size,
                            "progress"
                        );
                        last_report = now;
                    }
                    let Some(window) = watchdog else { continue };
                    let activity = snap.generated + snap.accepted;
                    if activity != last_activity {
                        last_activity = activity;
                        last_change = now;
                        continue;
                    }
                    let stalled_for = now.duration_since(last_change);
                    if stalled_for < window {
                        continue;
                    }
                    match &action {
                        StallAction::Abort => {
                            error!(
                                stalled_ms = stalled_for.as_millis() as u64,
                                abandoned_workers = snap.abandoned_workers,
                                candidate = %snap.current_candidate,
                                "no progress, aborting"
                            );
                            std::process::exit(WATCHDOG_EXIT_CODE);
                        }
                        StallAction::Report(callback) => {
                            callback(&StallInfo { snapshot: snap, stalled_for });
                            last_change = now;
                        }
                    }
                }
            })
            .map_err(EngineError::Spawn)?;
        Ok(ProgressMonitor {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
