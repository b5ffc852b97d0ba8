//! Simulated transmitter: register file, predistorter and a compressing PA.
//!
//! `SimTransmitter` is the RPC-facing side (`Adapt`); `SimMeasure` captures
//! from the same state. Both are cheap clones over one `Arc<Mutex<_>>`.
use crate::median;
use dpdce_config::SimCfg;
use dpdce_traits::{Adapt, BoxError, Capture, DpdData, Measure};
use num_complex::Complex32;
use std::f32::consts::TAU;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// RX gain (dB) at which the feedback path has unity gain.
const RX_UNITY_DB: f64 = 30.0;
const TONES: [(f32, f32); 3] = [(0.5, 0.013), (0.3, 0.031), (0.2, 0.057)];

#[derive(Debug, Clone)]
struct TxState {
    tx_gain: f64,
    rx_gain: f64,
    digital_gain: f64,
    predistorter: DpdData,
    cfg: SimCfg,
    samps: usize,
    samplerate: u32,
    captures: u64,
}

#[derive(Debug, Clone)]
pub struct SimTransmitter {
    state: Arc<Mutex<TxState>>,
}

impl SimTransmitter {
    pub fn new(cfg: SimCfg, samps: usize, samplerate: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(TxState {
                tx_gain: 70.0,
                rx_gain: RX_UNITY_DB,
                digital_gain: 0.6,
                predistorter: DpdData::default(),
                cfg,
                samps,
                samplerate: samplerate.max(1),
                captures: 0,
            })),
        }
    }

    /// Capture handle sharing this transmitter's state.
    pub fn measure(&self) -> SimMeasure {
        SimMeasure {
            tx: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn capture(&self) -> Capture {
        let mut st = self.lock();
        let start = st.captures * st.samps as u64;
        st.captures += 1;
        let rx_scale = 10f64.powf((st.rx_gain - RX_UNITY_DB) / 20.0) as f32;
        let dg = st.digital_gain as f32;

        // Every capture replays the same frame; only the timestamp moves.
        let tx: Vec<Complex32> = (0..st.samps as u64)
            .map(|i| reference(i) * dg)
            .collect();
        let rx: Vec<Complex32> = tx
            .iter()
            .map(|&x| amplify(predistort(&st.predistorter, x), &st.cfg) * rx_scale)
            .collect();

        let t = start as f64 / f64::from(st.samplerate);
        Capture {
            tx_median: median(tx.iter().map(|c| c.norm()).collect()),
            rx_median: median(rx.iter().map(|c| c.norm()).collect()),
            tx_samples: tx,
            tx_timestamp: t,
            rx_samples: rx,
            rx_timestamp: t,
        }
    }
}

/// Unit-peak multi-tone reference at sample `n`.
fn reference(n: u64) -> Complex32 {
    TONES
        .iter()
        .map(|&(amp, f)| {
            let cycles = (n as f64 * f64::from(f)).fract() as f32;
            Complex32::from_polar(amp, TAU * cycles)
        })
        .sum()
}

/// Apply gain and phase polynomials (or table lookup) in |x|.
pub(crate) fn predistort(dpd: &DpdData, x: Complex32) -> Complex32 {
    let r = x.norm();
    match dpd {
        DpdData::Poly { coefs_am, coefs_pm } => {
            let g = poly(coefs_am, r);
            let p = poly(coefs_pm, r);
            x * Complex32::from_polar(g, p)
        }
        DpdData::Lut { scalefactor, table } => {
            if table.is_empty() {
                return x;
            }
            let idx = ((r * scalefactor) as usize).min(table.len() - 1);
            x * table[idx]
        }
    }
}

/// Soft-limiting PA with amplitude-dependent phase rotation.
pub(crate) fn amplify(x: Complex32, cfg: &SimCfg) -> Complex32 {
    let u = x.norm() / cfg.saturation;
    let u2 = u * u;
    let gain = 1.0 / (1.0 + u2).sqrt();
    let phase = cfg.am_pm_rad * u2 / (1.0 + u2);
    x * Complex32::from_polar(gain, phase)
}

pub(crate) fn poly(coefs: &[f32], r: f32) -> f32 {
    coefs.iter().rev().fold(0.0, |acc, c| acc * r + c)
}

impl Adapt for SimTransmitter {
    fn get_txgain(&mut self) -> Result<f64, BoxError> {
        Ok(self.lock().tx_gain)
    }
    fn get_rxgain(&mut self) -> Result<f64, BoxError> {
        Ok(self.lock().rx_gain)
    }
    fn get_digital_gain(&mut self) -> Result<f64, BoxError> {
        Ok(self.lock().digital_gain)
    }
    fn get_predistorter(&mut self) -> Result<DpdData, BoxError> {
        Ok(self.lock().predistorter.clone())
    }
    fn set_rxgain(&mut self, gain: f64) -> Result<(), BoxError> {
        self.lock().rx_gain = gain;
        Ok(())
    }
    fn set_digital_gain(&mut self, gain: f64) -> Result<(), BoxError> {
        if !(gain.is_finite() && gain >= 0.0) {
            return Err(format!("digital gain {gain} rejected").into());
        }
        self.lock().digital_gain = gain;
        Ok(())
    }
    fn set_predistorter(&mut self, dpd: &DpdData) -> Result<(), BoxError> {
        self.lock().predistorter = dpd.clone();
        Ok(())
    }
    fn dump(&mut self) -> Result<(), BoxError> {
        let st = self.lock();
        tracing::info!(
            tx_gain = st.tx_gain,
            rx_gain = st.rx_gain,
            digital_gain = st.digital_gain,
            "sim transmitter, {}",
            st.predistorter
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SimMeasure {
    tx: SimTransmitter,
}

impl Measure for SimMeasure {
    fn get_samples(&mut self) -> Result<Capture, BoxError> {
        Ok(self.tx.capture())
    }
}
