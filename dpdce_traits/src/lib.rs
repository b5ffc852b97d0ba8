//! Collaborator interfaces for the DPD computation engine.
//!
//! The engine core never touches sample buffers, model mathematics or the
//! transmitter wire protocol directly; it drives these traits. All methods
//! report failures as `Box<dyn Error + Send + Sync>` so implementations are
//! free to use their own error types.

pub mod clock;
pub mod dpd;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dpd::DpdData;

use num_complex::Complex32;
use std::path::Path;

/// Error type at collaborator boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One aligned TX/RX capture from the transmitter's feedback path.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    pub tx_samples: Vec<Complex32>,
    pub tx_timestamp: f64,
    pub rx_samples: Vec<Complex32>,
    pub rx_timestamp: f64,
    pub rx_median: f64,
    pub tx_median: f64,
}

/// Per-bin statistics extracted from the accumulated captures.
///
/// Any array may be absent when the accumulated data is not yet sufficient.
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    pub tx: Option<Vec<f32>>,
    pub rx: Option<Vec<f32>>,
    pub phase_diff: Option<Vec<f32>>,
    pub n_per_bin: Option<Vec<usize>>,
}

impl Extracted {
    /// Borrow the three training arrays if all of them are present.
    pub fn training_arrays(&self) -> Option<(&[f32], &[f32], &[f32])> {
        match (&self.tx, &self.rx, &self.phase_diff) {
            (Some(tx), Some(rx), Some(pd)) => Some((tx, rx, pd)),
            _ => None,
        }
    }
}

/// Acquires aligned TX/RX sample buffers.
pub trait Measure {
    fn get_samples(&mut self) -> Result<Capture, BoxError>;
}

/// Accumulates amplitude/phase behaviour across capture rounds.
pub trait ExtractStatistic {
    fn extract(&mut self, tx: &[Complex32], rx: &[Complex32]) -> Result<Extracted, BoxError>;
    /// Number of captures accumulated so far.
    fn n_meas(&self) -> usize;
    fn bin_info(&self) -> String;
    fn plot(&self, path: &Path, label: &str) -> Result<(), BoxError>;
}

/// Creates a fresh extraction window; the peak estimate decides the bin layout.
pub trait StatisticFactory {
    fn create(&self, peak_estimate: f64) -> Box<dyn ExtractStatistic + Send>;
}

/// The predistortion model.
pub trait Model {
    fn train(
        &mut self,
        tx: &[f32],
        rx: &[f32],
        phase_diff: &[f32],
        lr: f64,
    ) -> Result<(), BoxError>;
    fn dpd_data(&self) -> DpdData;
    fn reset_coefs(&mut self);
    fn plot(&self, am_path: &Path, pm_path: &Path, label: &str) -> Result<(), BoxError>;
}

/// Remote-control client of the transmitter.
pub trait Adapt {
    fn get_txgain(&mut self) -> Result<f64, BoxError>;
    fn get_rxgain(&mut self) -> Result<f64, BoxError>;
    fn get_digital_gain(&mut self) -> Result<f64, BoxError>;
    fn get_predistorter(&mut self) -> Result<DpdData, BoxError>;
    fn set_rxgain(&mut self, gain: f64) -> Result<(), BoxError>;
    fn set_digital_gain(&mut self, gain: f64) -> Result<(), BoxError>;
    fn set_predistorter(&mut self, dpd: &DpdData) -> Result<(), BoxError>;
    /// Persist the transmitter's current settings.
    fn dump(&mut self) -> Result<(), BoxError>;
}

/// A single automatic gain control trial.
pub trait Agc {
    /// Returns whether the trial succeeded and a (possibly multi-line) summary.
    fn run(&mut self) -> Result<(bool, String), BoxError>;
}

/// Maps the outer run counter to a measurement target and a learning rate.
pub trait Heuristics {
    fn get_n_meas(&self, run: u32) -> usize;
    fn get_learning_rate(&self, run: u32) -> f64;
}
