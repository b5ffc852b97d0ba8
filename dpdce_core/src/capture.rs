//! Capture + model phase.
//!
//! Capture rounds feed one extraction window until the schedule's target is
//! met, then the model is trained once and its predistortion data published.
//! Target and learning rate come from the run counter as it was when the
//! phase started, not from the number of rounds taken in this phase.
use crate::error::{EngineError, Result, collab};
use crate::state::EngineState;
use crate::worker::Worker;
use dpdce_traits::Extracted;

/// Progress never exceeds this while still capturing.
const CAPTURE_PROGRESS_CAP: u8 = 75;

impl Worker {
    pub(crate) fn capture_and_model(&mut self) -> Result<()> {
        let n_runs = self.shared.update(|s| {
            s.results.enter(EngineState::CapturingAndModeling);
            s.counters.n_runs
        });
        let target = self.heuristics.get_n_meas(n_runs);
        let step = self.params.progress_step;
        tracing::debug!(n_runs, target, "capture phase");

        let extracted = self.capture_rounds(target, step)?;
        let Some((tx, rx, phase_diff)) = extracted.training_arrays() else {
            return Err(EngineError::NoData.into());
        };

        self.shared.update(|s| {
            s.results.progress_percent = 80;
            s.results.summary.push("Training model".to_string());
        });
        let lr = self.heuristics.get_learning_rate(n_runs);
        self.model
            .train(tx, rx, phase_diff, lr)
            .map_err(collab(EngineError::Model))?;
        tracing::info!(lr, bins = tx.len(), "model trained");

        let stamp = self.artifacts.stamp();
        let am = self.artifacts.file("model_am", &stamp);
        let pm = self.artifacts.file("model_pm", &stamp);
        let plot_warning = match self.model.plot(&am.path, &pm.path, &stamp.label) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(error = %e, "model plot failed");
                Some(format!("failed to write model plots: {e}"))
            }
        };
        self.shared.update(|s| {
            if plot_warning.is_none() {
                s.results.am_plot = Some(am.public);
                s.results.pm_plot = Some(pm.public);
            }
            s.results.summary.extend(plot_warning);
            s.results.progress_percent = 85;
            s.results.summary.push("Getting DPD data".to_string());
        });

        let dpd = self.model.dpd_data();
        tracing::info!(dpd = %dpd, "new predistorter computed");
        self.shared.update(|s| {
            s.settings.predistorter = dpd;
            s.counters.n_runs = 0;
            s.results.progress_percent = 90;
            s.results.summary.push("Reset statistics".to_string());
        });
        self.stat = None;

        self.shared
            .update(|s| s.results.finish("New DPD coefficients calculated"));
        Ok(())
    }

    /// Capture and extract until the window holds `target` measurements.
    fn capture_rounds(&mut self, target: usize, step: u8) -> Result<Extracted> {
        let mut rounds = 0;
        loop {
            let done_so_far = self.stat.as_ref().map_or(0, |s| s.n_meas());
            if rounds >= self.params.max_capture_rounds {
                return Err(EngineError::CaptureBudget {
                    done: done_so_far,
                    target,
                    rounds,
                }
                .into());
            }
            rounds += 1;

            let capture = self
                .measure
                .get_samples()
                .map_err(collab(EngineError::Capture))?;

            let factory = &self.stats;
            let median_to_peak = self.params.median_to_peak;
            let stat = self.stat.get_or_insert_with(|| {
                let peak = capture.tx_median * median_to_peak;
                tracing::debug!(peak, "opening extraction window");
                factory.create(peak)
            });

            let head = vec![
                format!("Captured {} samples", capture.tx_samples.len()),
                format!("TX/RX median: {} / {}", capture.tx_median, capture.rx_median),
                stat.bin_info(),
            ];
            self.shared.update(|s| {
                s.results.advance(step, CAPTURE_PROGRESS_CAP);
                s.results.summary = head;
            });

            let extracted = stat
                .extract(&capture.tx_samples, &capture.rx_samples)
                .map_err(collab(EngineError::Extraction))?;

            let stamp = self.artifacts.stamp();
            let plot = self.artifacts.file("stats", &stamp);
            let plotted = match stat.plot(&plot.path, &stamp.label) {
                Ok(()) => Some(plot.public),
                Err(e) => {
                    tracing::warn!(error = %e, "statistics plot failed");
                    None
                }
            };

            let done = stat.n_meas();
            self.shared.update(|s| {
                match plotted {
                    Some(public) => s.results.stat_plot = Some(public),
                    None => s
                        .results
                        .summary
                        .push("failed to write statistics plot".to_string()),
                }
                s.results.advance(step, CAPTURE_PROGRESS_CAP);
                s.results.summary.push("Extracted statistics".to_string());
                s.results.summary.push(format!("Runs: {done}/{target}"));
                s.counters.n_runs = s.counters.n_runs.saturating_add(1);
            });
            tracing::debug!(round = rounds, done, target, "capture round");

            if done >= target {
                return Ok(extracted);
            }
        }
    }
}
