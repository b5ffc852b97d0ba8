//! Engine bootstrap: baseline settings, the worker thread and its shutdown.
//!
//! `Engine` owns the worker's join handle. Dropping it sends `Quit` and
//! joins, so the worker never outlives the value that started it.
use crate::artifacts::ArtifactManager;
use crate::command::{self, CommandSender};
use crate::error::{EngineError, Report, Result, collab};
use crate::state::{SharedState, Settings};
use crate::worker::{Collaborators, PhaseParams, Worker};
use dpdce_traits::{Adapt, Clock, Model};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Digital gain written by `reset_to_defaults`.
pub const DEFAULT_DIGITAL_GAIN: f64 = 0.01;
/// RX gain written by `reset_to_defaults`.
pub const DEFAULT_RX_GAIN: f64 = 0.0;

/// Runtime parameters of the engine, usually built from the TOML config.
#[derive(Debug, Clone)]
pub struct EngineParams {
    pub plot_directory: PathBuf,
    pub median_to_peak: f64,
    pub max_capture_rounds: usize,
    pub progress_step: u8,
}

impl EngineParams {
    pub fn phase(&self) -> PhaseParams {
        PhaseParams {
            median_to_peak: self.median_to_peak,
            max_capture_rounds: self.max_capture_rounds,
            progress_step: self.progress_step,
        }
    }
}

/// Read the transmitter's current gains and predistorter.
pub fn current_settings<A: Adapt + ?Sized>(adapt: &mut A) -> Result<Settings> {
    Ok(Settings {
        tx_gain: adapt.get_txgain().map_err(collab(EngineError::Transmitter))?,
        rx_gain: adapt.get_rxgain().map_err(collab(EngineError::Transmitter))?,
        digital_gain: adapt
            .get_digital_gain()
            .map_err(collab(EngineError::Transmitter))?,
        predistorter: adapt
            .get_predistorter()
            .map_err(collab(EngineError::Transmitter))?,
    })
}

/// Put the transmitter back to a known baseline: model defaults as the
/// predistorter, low digital gain and zero RX gain.
pub fn reset_to_defaults<A, M>(adapt: &mut A, model: &mut M) -> Result<()>
where
    A: Adapt + ?Sized,
    M: Model + ?Sized,
{
    model.reset_coefs();
    adapt
        .set_digital_gain(DEFAULT_DIGITAL_GAIN)
        .map_err(collab(EngineError::Transmitter))?;
    adapt
        .set_rxgain(DEFAULT_RX_GAIN)
        .map_err(collab(EngineError::Transmitter))?;
    adapt
        .set_predistorter(&model.dpd_data())
        .map_err(collab(EngineError::Transmitter))?;
    tracing::info!(
        digital_gain = DEFAULT_DIGITAL_GAIN,
        rx_gain = DEFAULT_RX_GAIN,
        "transmitter reset to defaults"
    );
    Ok(())
}

pub struct Engine {
    shared: Arc<SharedState>,
    commands: CommandSender,
    worker: Option<JoinHandle<()>>,
}

impl Engine {
    /// Query baseline settings, prepare the plot directory and spawn the worker.
    pub fn start(
        mut collaborators: Collaborators,
        params: EngineParams,
        clock: Box<dyn Clock + Send>,
    ) -> Result<Self> {
        let settings = current_settings(&mut *collaborators.adapt)?;
        tracing::info!(
            tx_gain = settings.tx_gain,
            rx_gain = settings.rx_gain,
            digital_gain = settings.digital_gain,
            "transmitter running, predistorter {}",
            settings.predistorter
        );

        let artifacts = ArtifactManager::new(&params.plot_directory, clock);
        artifacts.ensure_dir().map_err(|e| {
            Report::new(EngineError::Artifact(format!(
                "create {}: {e}",
                params.plot_directory.display()
            )))
        })?;

        let shared = Arc::new(SharedState::new(settings));
        let (commands, receiver) = command::channel();
        let worker = Worker::new(Arc::clone(&shared), collaborators, artifacts, params.phase());
        let handle = std::thread::Builder::new()
            .name("dpdce-worker".into())
            .spawn(move || worker.run(receiver))
            .map_err(|e| Report::new(EngineError::Panic(format!("spawn worker: {e}"))))?;

        Ok(Self {
            shared,
            commands,
            worker: Some(handle),
        })
    }

    pub fn shared(&self) -> Arc<SharedState> {
        Arc::clone(&self.shared)
    }

    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    /// Stop the worker after its current phase and wait for it.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.worker.take() {
            if !self.commands.quit() {
                tracing::debug!("worker already gone");
            }
            if let Err(e) = handle.join() {
                tracing::warn!(?e, "worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}
