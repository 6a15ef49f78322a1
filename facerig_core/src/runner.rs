//! Background script execution.
//!
//! One worker thread at a time walks a parsed [`Script`], taking the rig lock
//! per motion line. Cancellation is cooperative: the worker checks its
//! [`CancelToken`] before each line and between delay slices, never in the
//! middle of a write.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use facerig_traits::Clock;

use crate::SharedRig;
use crate::config::ScriptCfg;
use crate::error::RigError;
use crate::rig::MoveMode;
use crate::script::{Instruction, Script};
use crate::status::ExecutionState;
use crate::util::{CancelToken, sleep_sliced};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub moves: usize,
    pub delays: usize,
    pub skipped: usize,
    /// Motion lines whose send returned an error.
    pub failures: usize,
    pub cancelled: bool,
    /// Set when the run stopped early on link loss.
    pub halted: Option<RigError>,
}

type StateCell = (Mutex<ExecutionState>, Condvar);

pub struct ScriptRunner {
    rig: SharedRig,
    cfg: ScriptCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    state: Arc<StateCell>,
    cursor: Arc<AtomicUsize>,
    token: Mutex<CancelToken>,
    handle: Mutex<Option<JoinHandle<Result<RunSummary, RigError>>>>,
}

fn lock_state(cell: &StateCell) -> MutexGuard<'_, ExecutionState> {
    cell.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Returns the runner to `Idle` however the worker exits, panics included.
struct IdleOnDrop {
    state: Arc<StateCell>,
    cursor: Arc<AtomicUsize>,
}

impl Drop for IdleOnDrop {
    fn drop(&mut self) {
        self.cursor.store(0, Ordering::SeqCst);
        *lock_state(&self.state) = ExecutionState::Idle;
        self.state.1.notify_all();
    }
}

impl ScriptRunner {
    pub fn new(rig: SharedRig, cfg: ScriptCfg, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            rig,
            cfg,
            clock,
            state: Arc::new((Mutex::new(ExecutionState::Idle), Condvar::new())),
            cursor: Arc::new(AtomicUsize::new(0)),
            token: Mutex::new(CancelToken::new()),
            handle: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ExecutionState {
        *lock_state(&self.state)
    }

    /// 1-based line currently executing, `None` when idle or between runs.
    pub fn cursor(&self) -> Option<usize> {
        match self.cursor.load(Ordering::SeqCst) {
            0 => None,
            n => Some(n),
        }
    }

    pub fn start(&self, script: Script) -> StartOutcome {
        let token = CancelToken::new();
        {
            let mut st = lock_state(&self.state);
            if st.is_busy() {
                tracing::info!(state = ?*st, "script already running; start ignored");
                return StartOutcome::AlreadyRunning;
            }
            // A stop that observes Running must find this run's token.
            if let Ok(mut t) = self.token.lock() {
                *t = token.clone();
            }
            *st = ExecutionState::Running;
        }
        // Reap the previous worker; it has already reported Idle.
        let _ = self.join();

        let worker = Worker {
            rig: self.rig.clone(),
            cfg: self.cfg.clone(),
            clock: Arc::clone(&self.clock),
            cursor: Arc::clone(&self.cursor),
            token,
        };
        let guard = IdleOnDrop {
            state: Arc::clone(&self.state),
            cursor: Arc::clone(&self.cursor),
        };
        tracing::info!(lines = script.lines().len(), motions = script.motion_count(), "script started");
        let handle = std::thread::spawn(move || {
            let _guard = guard;
            let res = worker.run(&script);
            match &res {
                Ok(s) => tracing::info!(
                    moves = s.moves,
                    skipped = s.skipped,
                    failures = s.failures,
                    cancelled = s.cancelled,
                    "script finished"
                ),
                Err(e) => tracing::error!(error = %e, "script abandoned"),
            }
            res
        });
        if let Ok(mut h) = self.handle.lock() {
            *h = Some(handle);
        }
        StartOutcome::Started
    }

    /// Request cancellation. Returns `false` when nothing is running.
    pub fn stop(&self) -> bool {
        let mut st = lock_state(&self.state);
        if *st != ExecutionState::Running {
            return false;
        }
        *st = ExecutionState::Cancelling;
        if let Ok(t) = self.token.lock() {
            t.cancel();
        }
        tracing::info!("script stop requested");
        true
    }

    /// Block until the worker reports Idle or `timeout` passes (wall time).
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let st = lock_state(&self.state);
        let res = self
            .state
            .1
            .wait_timeout_while(st, timeout, |s| s.is_busy());
        match res {
            Ok((st, _)) => !st.is_busy(),
            Err(p) => !p.into_inner().0.is_busy(),
        }
    }

    /// Wait for the last worker and take its result.
    ///
    /// `None` when no worker was started or it panicked.
    pub fn join(&self) -> Option<Result<RunSummary, RigError>> {
        let handle = self.handle.lock().ok()?.take()?;
        match handle.join() {
            Ok(res) => Some(res),
            Err(_) => {
                tracing::error!("script worker panicked");
                None
            }
        }
    }
}

struct Worker {
    rig: SharedRig,
    cfg: ScriptCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    cursor: Arc<AtomicUsize>,
    token: CancelToken,
}

impl Worker {
    fn with_rig<T>(&self, f: impl FnOnce(&mut crate::rig::Rig) -> T) -> Result<T, RigError> {
        let mut rig = self
            .rig
            .lock()
            .map_err(|_| RigError::State("rig lock poisoned".into()))?;
        Ok(f(&mut rig))
    }

    fn pause(&self, d: Duration) -> bool {
        sleep_sliced(self.clock.as_ref(), d, self.cfg.slice, &self.token)
    }

    /// `RESET` then wait for the servos to arrive. `false` if cancelled.
    fn neutral_pass(&self) -> Result<bool, RigError> {
        if let Err(e) = self.with_rig(|rig| rig.reset_to_neutral())? {
            tracing::warn!(error = %e, "neutral pass not delivered");
        }
        Ok(self.pause(self.cfg.neutral_settle))
    }

    fn run(&self, script: &Script) -> Result<RunSummary, RigError> {
        let mut summary = RunSummary::default();
        if !self.neutral_pass()? {
            summary.cancelled = true;
            return Ok(summary);
        }

        for line in script.lines() {
            if self.token.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            self.cursor.store(line.number, Ordering::SeqCst);
            match &line.instruction {
                Instruction::Move { channel, angle } => {
                    tracing::debug!(line = line.number, text = %line.text, "exec");
                    match self.with_rig(|rig| rig.move_channel(*channel, i32::from(*angle), MoveMode::Scripted))? {
                        Ok(out) => {
                            summary.moves += 1;
                            if out.report.is_partial() {
                                tracing::warn!(line = line.number, report = ?out.report, "partial delivery");
                            }
                        }
                        Err(e) if e.is_link_loss() && self.cfg.halt_on_link_loss => {
                            tracing::error!(line = line.number, error = %e, "link lost; halting script");
                            summary.failures += 1;
                            summary.halted = Some(e);
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(line = line.number, error = %e, "motion line failed");
                            summary.failures += 1;
                        }
                    }
                    if !self.pause(self.cfg.settle) {
                        summary.cancelled = true;
                        break;
                    }
                }
                Instruction::DelayMs(ms) => {
                    summary.delays += 1;
                    if !self.pause(Duration::from_millis(*ms)) {
                        summary.cancelled = true;
                        break;
                    }
                }
                Instruction::Skip(w) => {
                    tracing::warn!(line = line.number, text = %line.text, warning = %w, "line skipped");
                    summary.skipped += 1;
                }
                Instruction::Comment | Instruction::Blank => {}
            }
        }
        self.cursor.store(0, Ordering::SeqCst);

        if summary.cancelled {
            tracing::info!("script cancelled; rig left where it stopped");
        } else if summary.halted.is_none() {
            self.neutral_pass()?;
        }
        Ok(summary)
    }
}
