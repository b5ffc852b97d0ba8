//! State shared between the protocol server and the worker.
//!
//! One mutex guards settings, counters and results together. Readers copy a
//! snapshot out; the worker stages a whole update in one closure. Neither side
//! holds the lock across capture, training, transmitter RPC or file I/O.

use dpdce_traits::DpdData;
use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Externally visible worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Calibrating,
    CapturingAndModeling,
    Resetting,
    Terminated,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Idle => "Idle",
            EngineState::Calibrating => "RX Gain Calibration",
            EngineState::CapturingAndModeling => "Capture + Model",
            EngineState::Resetting => "Reset",
            EngineState::Terminated => "Terminated",
        };
        f.write_str(s)
    }
}

/// Transmitter settings as last read back (or computed) by the worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub rx_gain: f64,
    pub tx_gain: f64,
    pub digital_gain: f64,
    pub predistorter: DpdData,
}

/// Worker-private bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Capture rounds since the last model update or reset.
    pub n_runs: u32,
}

/// What `get_results` reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Results {
    pub state: EngineState,
    /// Always within 0..=100.
    pub progress_percent: u8,
    pub summary: Vec<String>,
    pub stat_plot: Option<String>,
    pub am_plot: Option<String>,
    pub pm_plot: Option<String>,
    pub tx_median: f64,
    pub rx_median: f64,
}

impl Default for Results {
    fn default() -> Self {
        Self {
            state: EngineState::Idle,
            progress_percent: 0,
            summary: vec!["DPD has not been calibrated yet".to_string()],
            stat_plot: None,
            am_plot: None,
            pm_plot: None,
            tx_median: 0.0,
            rx_median: 0.0,
        }
    }
}

impl Results {
    /// Enter a phase: new state and zero progress in one step.
    pub fn enter(&mut self, state: EngineState) {
        self.state = state;
        self.progress_percent = 0;
    }

    /// Leave a phase successfully.
    pub fn finish(&mut self, line: impl Into<String>) {
        self.state = EngineState::Idle;
        self.progress_percent = 100;
        self.summary.push(line.into());
    }

    /// Leave a phase after a failure; progress stays at zero.
    pub fn abort(&mut self, line: impl Into<String>) {
        self.state = EngineState::Idle;
        self.progress_percent = 0;
        self.summary.push(line.into());
    }

    pub fn clear_plots(&mut self) {
        self.stat_plot = None;
        self.am_plot = None;
        self.pm_plot = None;
    }

    /// Advance progress by `step`, never beyond `cap`.
    pub fn advance(&mut self, step: u8, cap: u8) {
        self.progress_percent = self.progress_percent.saturating_add(step).min(cap);
    }
}

/// Everything behind the lock, copied out as one generation.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub settings: Settings,
    pub counters: Counters,
    pub results: Results,
}

pub struct SharedState {
    inner: Mutex<Snapshot>,
}

impl SharedState {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Mutex::new(Snapshot {
                settings,
                counters: Counters::default(),
                results: Results::default(),
            }),
        }
    }

    // A panic inside a phase must not wedge the readers, so poisoning is ignored:
    // every update leaves the snapshot structurally valid.
    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn settings(&self) -> Settings {
        self.lock().settings.clone()
    }

    pub fn results(&self) -> Results {
        self.lock().results.clone()
    }

    pub fn n_runs(&self) -> u32 {
        self.lock().counters.n_runs
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().clone()
    }

    /// Apply one atomic update and return whatever the closure yields.
    pub fn update<R>(&self, f: impl FnOnce(&mut Snapshot) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }
}

impl fmt::Debug for SharedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snap = self.lock();
        f.debug_struct("SharedState")
            .field("state", &snap.results.state)
            .field("progress_percent", &snap.results.progress_percent)
            .field("n_runs", &snap.counters.n_runs)
            .finish()
    }
}
