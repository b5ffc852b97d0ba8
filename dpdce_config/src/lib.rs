#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the DPD computation engine.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - Only `[control]`, `[transmitter]` and `[paths]` are mandatory; every
//!   other section falls back to defaults tuned for a DAB transmitter.
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct ControlCfg {
    /// UDP port the request/response protocol is served on.
    pub port: u16,
    /// Address to bind the control socket to.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// How long a single receive may block before the accept loop retries.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_poll_timeout_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize)]
pub struct TransmitterCfg {
    /// Port of the modulator's DPD sample feedback server
    pub dpd_port: u16,
    /// Port of the modulator's remote-control interface
    pub rc_port: u16,
    pub samplerate: u32,
    /// Samples per capture
    pub samps: usize,
    /// File the modulator reads predistorter coefficients from
    pub coef_file: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct PathsCfg {
    pub logs_directory: PathBuf,
    /// Where stat/model plots are written; cleared on calibrate and reset.
    pub plot_directory: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineCfg {
    /// Ratio used to estimate the TX peak amplitude from its median.
    pub median_to_peak: f64,
    /// Abort a capture phase whose extractor still has too few
    /// measurements after this many rounds.
    pub max_capture_rounds: usize,
    /// Progress increment (percent) per capture and per extraction step.
    pub progress_step: u8,
}

impl Default for EngineCfg {
    fn default() -> Self {
        Self {
            median_to_peak: 12.0,
            max_capture_rounds: 100,
            progress_step: 5,
        }
    }
}

/// Shape of the annealing schedule: measurement count grows and learning
/// rate shrinks linearly until `run_max`.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ScheduleCfg {
    pub n_meas_min: usize,
    pub n_meas_max: usize,
    pub lr_min: f64,
    pub lr_max: f64,
    pub run_max: u32,
}

impl Default for ScheduleCfg {
    fn default() -> Self {
        Self {
            n_meas_min: 10,
            n_meas_max: 20,
            lr_min: 0.05,
            lr_max: 0.4,
            run_max: 10,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Parameters of the simulated transmitter used when no hardware is attached.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SimCfg {
    /// Input amplitude at which the simulated PA output saturates.
    pub saturation: f32,
    /// Phase rotation (rad) at saturation, scales with |x|^2.
    pub am_pm_rad: f32,
    /// RX median the simulated AGC steers towards.
    pub target_rx_median: f64,
    /// Number of amplitude bins in the simulated statistic extractor.
    pub n_bins: usize,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            saturation: 0.8,
            am_pm_rad: 0.2,
            target_rx_median: 0.05,
            n_bins: 16,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub control: ControlCfg,
    pub transmitter: TransmitterCfg,
    pub paths: PathsCfg,
    #[serde(default)]
    pub engine: EngineCfg,
    #[serde(default)]
    pub schedule: ScheduleCfg,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub sim: SimCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Control
        if self.control.port == 0 {
            eyre::bail!("control.port must be > 0");
        }
        if self.control.bind.trim().is_empty() {
            eyre::bail!("control.bind must not be empty");
        }
        if self.control.poll_timeout_ms == 0 {
            eyre::bail!("control.poll_timeout_ms must be >= 1");
        }
        if self.control.poll_timeout_ms > 60 * 1000 {
            eyre::bail!("control.poll_timeout_ms is unreasonably large (>60s)");
        }

        // Transmitter
        if self.transmitter.dpd_port == 0 {
            eyre::bail!("transmitter.dpd_port must be > 0");
        }
        if self.transmitter.rc_port == 0 {
            eyre::bail!("transmitter.rc_port must be > 0");
        }
        if self.transmitter.samplerate == 0 {
            eyre::bail!("transmitter.samplerate must be > 0");
        }
        if self.transmitter.samps == 0 {
            eyre::bail!("transmitter.samps must be >= 1");
        }

        // Paths
        if self.paths.plot_directory.as_os_str().is_empty() {
            eyre::bail!("paths.plot_directory must not be empty");
        }

        // Engine
        if !(self.engine.median_to_peak.is_finite() && self.engine.median_to_peak > 0.0) {
            eyre::bail!("engine.median_to_peak must be > 0");
        }
        if self.engine.max_capture_rounds == 0 {
            eyre::bail!("engine.max_capture_rounds must be >= 1");
        }
        if self.engine.progress_step == 0 || self.engine.progress_step > 20 {
            eyre::bail!("engine.progress_step must be in [1, 20]");
        }

        // Schedule
        let s = &self.schedule;
        if s.n_meas_min == 0 {
            eyre::bail!("schedule.n_meas_min must be >= 1");
        }
        if s.n_meas_max < s.n_meas_min {
            eyre::bail!("schedule.n_meas_max must be >= schedule.n_meas_min");
        }
        if !(s.lr_min > 0.0 && s.lr_min <= 1.0) {
            eyre::bail!("schedule.lr_min must be in (0.0, 1.0]");
        }
        if !(s.lr_max >= s.lr_min && s.lr_max <= 1.0) {
            eyre::bail!("schedule.lr_max must be in [schedule.lr_min, 1.0]");
        }
        if s.run_max == 0 {
            eyre::bail!("schedule.run_max must be >= 1");
        }
        if s.n_meas_max > self.engine.max_capture_rounds {
            eyre::bail!("schedule.n_meas_max must not exceed engine.max_capture_rounds");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Sim
        if !(self.sim.saturation > 0.0) {
            eyre::bail!("sim.saturation must be > 0");
        }
        if self.sim.n_bins < 2 {
            eyre::bail!("sim.n_bins must be >= 2");
        }
        if !(self.sim.target_rx_median > 0.0) {
            eyre::bail!("sim.target_rx_median must be > 0");
        }

        Ok(())
    }
}
