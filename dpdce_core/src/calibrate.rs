//! Bounded RX gain calibration.
use crate::error::{EngineError, Result, collab};
use crate::state::EngineState;
use crate::worker::Worker;

/// Upper bound on AGC trials per `calibrate` command.
pub const MAX_TRIALS: usize = 5;

const ONGOING: &str = "Calibration ongoing:";

/// Progress after `done` of `MAX_TRIALS` trials, rounded to whole percent.
#[inline]
pub(crate) fn trial_progress(done: usize) -> u8 {
    let pct = (done.min(MAX_TRIALS) as f64 * 100.0 / MAX_TRIALS as f64).round();
    pct as u8
}

impl Worker {
    /// Run up to `MAX_TRIALS` AGC trials, stopping at the first failed one,
    /// then read back what was actually achieved.
    pub(crate) fn calibrate(&mut self) -> Result<()> {
        self.shared.update(|s| {
            s.results.enter(EngineState::Calibrating);
            s.results.clear_plots();
            s.results.summary = vec![ONGOING.to_string()];
        });
        let mut summary = self.artifacts.clear();

        for trial in 1..=MAX_TRIALS {
            let (ok, text) = self.agc.run().map_err(collab(EngineError::Agc))?;
            summary.push(format!("Trial {trial}:"));
            summary.extend(text.lines().map(str::to_owned));

            let progress = trial_progress(trial);
            self.shared.update(|s| {
                s.results.progress_percent = progress;
                s.results.summary = std::iter::once(ONGOING.to_string())
                    .chain(summary.iter().cloned())
                    .collect();
            });
            tracing::info!(trial, success = ok, "gain control trial");

            if !ok {
                tracing::warn!(trial, "gain control trial failed, stopping calibration");
                break;
            }
        }

        let capture = self
            .measure
            .get_samples()
            .map_err(collab(EngineError::Capture))?;
        let rx_gain = self
            .adapt
            .get_rxgain()
            .map_err(collab(EngineError::Transmitter))?;
        let digital_gain = self
            .adapt
            .get_digital_gain()
            .map_err(collab(EngineError::Transmitter))?;

        tracing::info!(
            rx_gain,
            digital_gain,
            tx_median = capture.tx_median,
            rx_median = capture.rx_median,
            "calibration done"
        );
        summary.push("Calibration done".to_string());
        self.shared.update(|s| {
            s.settings.rx_gain = rx_gain;
            s.settings.digital_gain = digital_gain;
            s.results.tx_median = capture.tx_median;
            s.results.rx_median = capture.rx_median;
            s.results.summary = summary;
            s.results.state = EngineState::Idle;
            s.results.progress_percent = 100;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::trial_progress;

    #[test]
    fn progress_per_trial() {
        let got: Vec<u8> = (0..=5).map(trial_progress).collect();
        assert_eq!(got, vec![0, 20, 40, 60, 80, 100]);
        assert_eq!(trial_progress(9), 100);
    }
}
