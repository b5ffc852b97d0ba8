//! The single worker thread and its command state machine.
//!
//! The worker owns every collaborator and is the only writer of
//! `SharedState`. Its one suspension point is `CommandReceiver::dequeue`;
//! once a command is taken the whole phase runs to completion.
//!
//! Two guards keep the published state honest on every exit path:
//! - `IdleGuard` wraps each dispatch and forces `Idle` afterwards, panics included.
//! - `TerminateGuard` wraps the outer loop and publishes `Terminated` last.
use crate::artifacts::ArtifactManager;
use crate::command::{Command, CommandReceiver};
use crate::error::{EngineError, Report, Result};
use crate::state::{EngineState, SharedState};
use dpdce_traits::{Adapt, Agc, ExtractStatistic, Heuristics, Measure, Model, StatisticFactory};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// The external collaborators driven by the worker.
pub struct Collaborators {
    pub measure: Box<dyn Measure + Send>,
    pub stats: Box<dyn StatisticFactory + Send>,
    pub model: Box<dyn Model + Send>,
    pub adapt: Box<dyn Adapt + Send>,
    pub agc: Box<dyn Agc + Send>,
    pub heuristics: Box<dyn Heuristics + Send>,
}

/// Tunables of the capture phase.
#[derive(Debug, Clone, Copy)]
pub struct PhaseParams {
    pub median_to_peak: f64,
    pub max_capture_rounds: usize,
    pub progress_step: u8,
}

pub struct Worker {
    pub(crate) shared: Arc<SharedState>,
    pub(crate) measure: Box<dyn Measure + Send>,
    pub(crate) stats: Box<dyn StatisticFactory + Send>,
    pub(crate) model: Box<dyn Model + Send>,
    pub(crate) adapt: Box<dyn Adapt + Send>,
    pub(crate) agc: Box<dyn Agc + Send>,
    pub(crate) heuristics: Box<dyn Heuristics + Send>,
    pub(crate) artifacts: ArtifactManager,
    pub(crate) params: PhaseParams,
    /// Open extraction window; spans `trigger_run`s until a model update or reset.
    pub(crate) stat: Option<Box<dyn ExtractStatistic + Send>>,
}

impl Worker {
    pub fn new(
        shared: Arc<SharedState>,
        collaborators: Collaborators,
        artifacts: ArtifactManager,
        params: PhaseParams,
    ) -> Self {
        let Collaborators {
            measure,
            stats,
            model,
            adapt,
            agc,
            heuristics,
        } = collaborators;
        Self {
            shared,
            measure,
            stats,
            model,
            adapt,
            agc,
            heuristics,
            artifacts,
            params,
            stat: None,
        }
    }

    /// Outer loop: take commands until `Quit` or until every sender is gone.
    pub fn run(mut self, commands: CommandReceiver) {
        let _terminated = TerminateGuard(Arc::clone(&self.shared));
        // Dropped before the guard, so nothing is admitted once Terminated is visible.
        let commands = commands;
        tracing::info!("worker started");
        while let Some(cmd) = commands.dequeue() {
            if cmd == Command::Quit {
                tracing::info!("quit received");
                break;
            }
            self.dispatch(cmd);
        }
    }

    /// Run one command to completion; failures are narrated in the summary.
    pub fn dispatch(&mut self, cmd: Command) {
        let _idle = IdleGuard(Arc::clone(&self.shared));
        tracing::info!(command = ?cmd, "phase start");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(cmd)));
        match outcome {
            Ok(Ok(())) => tracing::info!(command = ?cmd, "phase done"),
            Ok(Err(e)) => self.abort_phase(cmd, &e),
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                self.abort_phase(cmd, &Report::new(EngineError::Panic(msg)));
            }
        }
    }

    fn execute(&mut self, cmd: Command) -> Result<()> {
        match cmd {
            Command::Calibrate => self.calibrate(),
            Command::TriggerRun => self.capture_and_model(),
            Command::Reset => {
                self.reset();
                Ok(())
            }
            // Handled by the outer loop.
            Command::Quit => Ok(()),
        }
    }

    fn reset(&mut self) {
        self.shared.update(|s| {
            s.results.enter(EngineState::Resetting);
            s.results.clear_plots();
        });
        let warnings = self.artifacts.clear();
        self.stat = None;
        self.model.reset_coefs();
        self.shared.update(|s| {
            s.counters.n_runs = 0;
            s.results.summary = std::iter::once("Reset".to_string())
                .chain(warnings)
                .collect();
            s.results.state = EngineState::Idle;
            s.results.progress_percent = 0;
        });
    }

    fn abort_phase(&self, cmd: Command, err: &Report) {
        tracing::error!(command = ?cmd, error = %err, "phase aborted");
        self.shared
            .update(|s| s.results.abort(format!("Error! {err}")));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

struct IdleGuard(Arc<SharedState>);

impl Drop for IdleGuard {
    fn drop(&mut self) {
        self.0.update(|s| {
            if !matches!(s.results.state, EngineState::Idle | EngineState::Terminated) {
                tracing::warn!(state = %s.results.state, "phase left non-idle state, forcing idle");
                s.results.state = EngineState::Idle;
            }
        });
    }
}

struct TerminateGuard(Arc<SharedState>);

impl Drop for TerminateGuard {
    fn drop(&mut self) {
        self.0.update(|s| {
            s.results.state = EngineState::Terminated;
            s.results.progress_percent = 0;
        });
        tracing::info!("worker terminated");
    }
}
