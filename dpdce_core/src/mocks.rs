//! Scripted collaborators for driving the engine without a transmitter.
//!
//! Every mock is `Clone` and shares its internals, so a test can hand one
//! clone to the engine and keep another to inspect what happened.
use crate::rpc::{Request, Transport, TransportError};
use crate::worker::Collaborators;
use dpdce_traits::{
    Adapt, Agc, BoxError, Capture, DpdData, ExtractStatistic, Extracted, Heuristics, Measure,
    Model, StatisticFactory,
};
use num_complex::Complex32;
use serde_json::Value;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn touch(path: &Path) -> Result<(), BoxError> {
    std::fs::write(path, b"png")?;
    Ok(())
}

/// Transmitter registers shared by `FakeAdapt` and `ScriptedAgc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Registers {
    pub tx_gain: f64,
    pub rx_gain: f64,
    pub digital_gain: f64,
    pub predistorter: DpdData,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            tx_gain: 70.0,
            rx_gain: 30.0,
            digital_gain: 0.6,
            predistorter: DpdData::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeAdapt {
    regs: Arc<Mutex<Registers>>,
    fail: Arc<AtomicBool>,
}

impl FakeAdapt {
    pub fn with_registers(regs: Registers) -> Self {
        Self {
            regs: Arc::new(Mutex::new(regs)),
            fail: Arc::default(),
        }
    }

    pub fn registers(&self) -> Registers {
        lock(&self.regs).clone()
    }

    /// Make every subsequent call fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn regs(&self) -> Result<MutexGuard<'_, Registers>, BoxError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("transmitter unreachable".into());
        }
        Ok(lock(&self.regs))
    }
}

impl Adapt for FakeAdapt {
    fn get_txgain(&mut self) -> Result<f64, BoxError> {
        Ok(self.regs()?.tx_gain)
    }
    fn get_rxgain(&mut self) -> Result<f64, BoxError> {
        Ok(self.regs()?.rx_gain)
    }
    fn get_digital_gain(&mut self) -> Result<f64, BoxError> {
        Ok(self.regs()?.digital_gain)
    }
    fn get_predistorter(&mut self) -> Result<DpdData, BoxError> {
        Ok(self.regs()?.predistorter.clone())
    }
    fn set_rxgain(&mut self, gain: f64) -> Result<(), BoxError> {
        self.regs()?.rx_gain = gain;
        Ok(())
    }
    fn set_digital_gain(&mut self, gain: f64) -> Result<(), BoxError> {
        self.regs()?.digital_gain = gain;
        Ok(())
    }
    fn set_predistorter(&mut self, dpd: &DpdData) -> Result<(), BoxError> {
        self.regs()?.predistorter = dpd.clone();
        Ok(())
    }
    fn dump(&mut self) -> Result<(), BoxError> {
        let regs = self.regs()?;
        tracing::debug!(?regs, "fake transmitter dump");
        Ok(())
    }
}

/// AGC that replays scripted trial outcomes, then succeeds forever.
/// With `steering`, each trial bumps the RX gain register by one.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgc {
    script: Arc<Mutex<VecDeque<Result<(bool, String), String>>>>,
    calls: Arc<AtomicUsize>,
    steering: Option<FakeAdapt>,
    delay: Duration,
}

impl ScriptedAgc {
    pub fn new(script: impl IntoIterator<Item = Result<(bool, String), String>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            ..Self::default()
        }
    }

    /// Trials pass until trial `n` (1-based), which fails.
    pub fn failing_at(n: usize) -> Self {
        Self::new((1..=n).map(|k| Ok((k != n, format!("rx median ok={}", k != n)))))
    }

    pub fn steering(mut self, adapt: &FakeAdapt) -> Self {
        self.steering = Some(adapt.clone());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Agc for ScriptedAgc {
    fn run(&mut self) -> Result<(bool, String), BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if let Some(adapt) = &self.steering {
            lock(&adapt.regs).rx_gain += 1.0;
        }
        match lock(&self.script).pop_front() {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(e)) => Err(e.into()),
            None => Ok((true, "rx median in range".to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeMeasure {
    pub tx_median: f64,
    pub rx_median: f64,
    pub n_samples: usize,
    delay: Duration,
    fail: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl Default for FakeMeasure {
    fn default() -> Self {
        Self {
            tx_median: 0.05,
            rx_median: 0.04,
            n_samples: 64,
            delay: Duration::ZERO,
            fail: Arc::default(),
            calls: Arc::default(),
        }
    }
}

impl FakeMeasure {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Measure for FakeMeasure {
    fn get_samples(&mut self) -> Result<Capture, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err("capture timed out".into());
        }
        let sig: Vec<Complex32> = (0..self.n_samples)
            .map(|i| Complex32::new((i as f32 * 0.1).sin(), 0.0))
            .collect();
        Ok(Capture {
            tx_samples: sig.clone(),
            tx_timestamp: 1.0,
            rx_samples: sig,
            rx_timestamp: 1.0,
            rx_median: self.rx_median,
            tx_median: self.tx_median,
        })
    }
}

/// Factory for `FakeStat`; records the peak estimate of every window it opens.
#[derive(Debug, Clone)]
pub struct FakeStatFactory {
    produce_data: Arc<AtomicBool>,
    peaks: Arc<Mutex<Vec<f64>>>,
}

impl Default for FakeStatFactory {
    fn default() -> Self {
        Self {
            produce_data: Arc::new(AtomicBool::new(true)),
            peaks: Arc::default(),
        }
    }
}

impl FakeStatFactory {
    /// Windows that count measurements but never yield training arrays.
    pub fn without_data() -> Self {
        Self {
            produce_data: Arc::new(AtomicBool::new(false)),
            peaks: Arc::default(),
        }
    }

    pub fn set_produce_data(&self, on: bool) {
        self.produce_data.store(on, Ordering::SeqCst);
    }

    pub fn peaks(&self) -> Vec<f64> {
        lock(&self.peaks).clone()
    }
}

impl StatisticFactory for FakeStatFactory {
    fn create(&self, peak_estimate: f64) -> Box<dyn ExtractStatistic + Send> {
        lock(&self.peaks).push(peak_estimate);
        Box::new(FakeStat {
            n_meas: 0,
            produce_data: Arc::clone(&self.produce_data),
        })
    }
}

/// Counts one measurement per `extract` call.
#[derive(Debug)]
pub struct FakeStat {
    n_meas: usize,
    produce_data: Arc<AtomicBool>,
}

impl ExtractStatistic for FakeStat {
    fn extract(&mut self, _tx: &[Complex32], _rx: &[Complex32]) -> Result<Extracted, BoxError> {
        self.n_meas += 1;
        if !self.produce_data.load(Ordering::SeqCst) {
            return Ok(Extracted::default());
        }
        let bins = vec![0.1, 0.2, 0.3, 0.4];
        Ok(Extracted {
            tx: Some(bins.clone()),
            rx: Some(bins.iter().map(|x| x * 0.9).collect()),
            phase_diff: Some(vec![0.0; bins.len()]),
            n_per_bin: Some(vec![self.n_meas; bins.len()]),
        })
    }

    fn n_meas(&self) -> usize {
        self.n_meas
    }

    fn bin_info(&self) -> String {
        format!("bins: 4, measurements: {}", self.n_meas)
    }

    fn plot(&self, path: &Path, _label: &str) -> Result<(), BoxError> {
        touch(path)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelLog {
    pub learning_rates: Vec<f64>,
    pub resets: usize,
}

/// Model whose AM coefficient tracks the number of training steps.
#[derive(Debug, Clone, Default)]
pub struct FakeModel {
    log: Arc<Mutex<ModelLog>>,
    fail: Arc<AtomicBool>,
}

impl FakeModel {
    pub fn log(&self) -> ModelLog {
        lock(&self.log).clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// DPD data after `steps` training steps.
    pub fn dpd_after(steps: usize) -> DpdData {
        DpdData::Poly {
            coefs_am: vec![1.0, steps as f32 * 0.01, 0.0, 0.0, 0.0],
            coefs_pm: vec![0.0; 5],
        }
    }
}

impl Model for FakeModel {
    fn train(
        &mut self,
        tx: &[f32],
        rx: &[f32],
        phase_diff: &[f32],
        lr: f64,
    ) -> Result<(), BoxError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("singular matrix".into());
        }
        if tx.len() != rx.len() || tx.len() != phase_diff.len() {
            return Err("length mismatch".into());
        }
        lock(&self.log).learning_rates.push(lr);
        Ok(())
    }

    fn dpd_data(&self) -> DpdData {
        Self::dpd_after(lock(&self.log).learning_rates.len())
    }

    fn reset_coefs(&mut self) {
        let mut log = lock(&self.log);
        log.learning_rates.clear();
        log.resets += 1;
    }

    fn plot(&self, am_path: &Path, pm_path: &Path, _label: &str) -> Result<(), BoxError> {
        touch(am_path)?;
        touch(pm_path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedSchedule {
    pub n_meas: usize,
    pub lr: f64,
}

impl Heuristics for FixedSchedule {
    fn get_n_meas(&self, _run: u32) -> usize {
        self.n_meas
    }
    fn get_learning_rate(&self, _run: u32) -> f64 {
        self.lr
    }
}

/// One handle per mock, for building `Collaborators` and inspecting them later.
#[derive(Debug, Clone)]
pub struct MockRig {
    pub measure: FakeMeasure,
    pub stats: FakeStatFactory,
    pub model: FakeModel,
    pub adapt: FakeAdapt,
    pub agc: ScriptedAgc,
    pub schedule: FixedSchedule,
}

impl Default for MockRig {
    fn default() -> Self {
        Self {
            measure: FakeMeasure::default(),
            stats: FakeStatFactory::default(),
            model: FakeModel::default(),
            adapt: FakeAdapt::default(),
            agc: ScriptedAgc::default(),
            schedule: FixedSchedule { n_meas: 3, lr: 0.2 },
        }
    }
}

impl MockRig {
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            measure: Box::new(self.measure.clone()),
            stats: Box::new(self.stats.clone()),
            model: Box::new(self.model.clone()),
            adapt: Box::new(self.adapt.clone()),
            agc: Box::new(self.agc.clone()),
            heuristics: Box::new(self.schedule),
        }
    }
}

/// A response the transport was asked to send.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Success { id: Value, payload: Value },
    Error { id: Value, message: String },
}

/// Transport that replays queued requests and then raises the shutdown flag.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: VecDeque<Result<Request, TransportError>>,
    sent: Arc<Mutex<Vec<Sent>>>,
    shutdown: Arc<AtomicBool>,
}

impl ScriptedTransport {
    pub fn new(shutdown: Arc<AtomicBool>) -> Self {
        Self {
            script: VecDeque::new(),
            sent: Arc::default(),
            shutdown,
        }
    }

    pub fn request(mut self, id: Value, method: &str, params: Value) -> Self {
        self.script.push_back(Ok(Request {
            addr: SocketAddr::from(([127, 0, 0, 1], 40000)),
            id,
            method: method.to_string(),
            params,
        }));
        self
    }

    pub fn then_err(mut self, err: TransportError) -> Self {
        self.script.push_back(Err(err));
        self
    }

    pub fn sent_log(&self) -> Arc<Mutex<Vec<Sent>>> {
        Arc::clone(&self.sent)
    }
}

impl Transport for ScriptedTransport {
    fn receive_request(&mut self) -> Result<Request, TransportError> {
        match self.script.pop_front() {
            Some(item) => item,
            None => {
                self.shutdown.store(true, Ordering::SeqCst);
                Err(TransportError::Timeout)
            }
        }
    }

    fn send_success_response(
        &mut self,
        _addr: SocketAddr,
        id: &Value,
        payload: Value,
    ) -> Result<(), TransportError> {
        lock(&self.sent).push(Sent::Success {
            id: id.clone(),
            payload,
        });
        Ok(())
    }

    fn send_error_response(
        &mut self,
        _addr: SocketAddr,
        id: &Value,
        message: &str,
    ) -> Result<(), TransportError> {
        lock(&self.sent).push(Sent::Error {
            id: id.clone(),
            message: message.to_string(),
        });
        Ok(())
    }
}
