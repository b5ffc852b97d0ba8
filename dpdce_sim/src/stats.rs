//! Amplitude-binned AM/AM and AM/PM statistics.
//!
//! Samples are binned by TX amplitude over `[0, peak)`. Each bin keeps
//! running sums of TX amplitude, RX amplitude and RX-vs-TX phase, so the
//! window can span many captures.
use crate::plot;
use dpdce_traits::{BoxError, ExtractStatistic, Extracted, StatisticFactory};
use num_complex::Complex32;
use std::path::Path;

/// Filled bins needed before training arrays are offered.
pub const MIN_FILLED_BINS: usize = 2;

#[derive(Debug, Clone, Copy, Default)]
struct Bin {
    tx: f64,
    rx: f64,
    phase: f64,
    count: usize,
}

#[derive(Debug)]
pub struct BinStat {
    peak: f32,
    bins: Vec<Bin>,
    n_meas: usize,
}

impl BinStat {
    pub fn new(peak: f64, n_bins: usize) -> Self {
        Self {
            peak: peak.max(f64::from(f32::MIN_POSITIVE)) as f32,
            bins: vec![Bin::default(); n_bins.max(1)],
            n_meas: 0,
        }
    }

    fn filled(&self) -> impl Iterator<Item = &Bin> {
        self.bins.iter().filter(|b| b.count > 0)
    }

    fn means(&self) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
        let mut tx = Vec::new();
        let mut rx = Vec::new();
        let mut ph = Vec::new();
        for b in self.filled() {
            let n = b.count as f64;
            tx.push((b.tx / n) as f32);
            rx.push((b.rx / n) as f32);
            ph.push((b.phase / n) as f32);
        }
        (tx, rx, ph)
    }
}

impl ExtractStatistic for BinStat {
    fn extract(&mut self, tx: &[Complex32], rx: &[Complex32]) -> Result<Extracted, BoxError> {
        if tx.len() != rx.len() {
            return Err(format!("tx/rx length mismatch: {} vs {}", tx.len(), rx.len()).into());
        }
        let n_bins = self.bins.len();
        for (t, r) in tx.iter().zip(rx) {
            let a = t.norm();
            let idx = (a / self.peak * n_bins as f32) as usize;
            if idx >= n_bins || a == 0.0 {
                continue;
            }
            let bin = &mut self.bins[idx];
            bin.tx += f64::from(a);
            bin.rx += f64::from(r.norm());
            bin.phase += f64::from((r * t.conj()).arg());
            bin.count += 1;
        }
        self.n_meas += 1;

        let n_per_bin = Some(self.bins.iter().map(|b| b.count).collect());
        if self.filled().count() < MIN_FILLED_BINS {
            return Ok(Extracted {
                n_per_bin,
                ..Extracted::default()
            });
        }
        let (tx, rx, phase_diff) = self.means();
        Ok(Extracted {
            tx: Some(tx),
            rx: Some(rx),
            phase_diff: Some(phase_diff),
            n_per_bin,
        })
    }

    fn n_meas(&self) -> usize {
        self.n_meas
    }

    fn bin_info(&self) -> String {
        format!(
            "Bins: {} filled of {}, peak {:.4}",
            self.filled().count(),
            self.bins.len(),
            self.peak
        )
    }

    fn plot(&self, path: &Path, label: &str) -> Result<(), BoxError> {
        let (tx, rx, _) = self.means();
        let points: Vec<(f32, f32)> = tx.iter().copied().zip(rx).collect();
        let ideal = vec![(0.0, 0.0), (self.peak, self.peak)];
        tracing::debug!(label, path = %path.display(), "plotting statistics");
        plot::draw(path, &[ideal], &points)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BinStatFactory {
    pub n_bins: usize,
}

impl StatisticFactory for BinStatFactory {
    fn create(&self, peak_estimate: f64) -> Box<dyn ExtractStatistic + Send> {
        Box::new(BinStat::new(peak_estimate, self.n_bins))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ramp(n: usize, peak: f32) -> Vec<Complex32> {
        (0..n)
            .map(|i| Complex32::new(peak * (i as f32 + 0.5) / n as f32, 0.0))
            .collect()
    }

    #[test]
    fn identity_path_yields_equal_tx_rx() {
        let mut stat = BinStat::new(1.0, 8);
        let tx = ramp(800, 1.0);
        let out = stat.extract(&tx, &tx).unwrap();
        let (t, r, p) = out.training_arrays().unwrap();
        assert_eq!(t.len(), 8);
        for ((a, b), ph) in t.iter().zip(r).zip(p) {
            assert!((a - b).abs() < 1e-6);
            assert!(ph.abs() < 1e-6);
        }
        assert_eq!(stat.n_meas(), 1);
    }

    #[test]
    fn phase_offset_is_measured() {
        let mut stat = BinStat::new(1.0, 4);
        let tx = ramp(400, 1.0);
        let rot = Complex32::from_polar(1.0, 0.1);
        let rx: Vec<_> = tx.iter().map(|x| x * rot).collect();
        let out = stat.extract(&tx, &rx).unwrap();
        for ph in out.phase_diff.unwrap() {
            assert!((ph - 0.1).abs() < 1e-4);
        }
    }

    #[rstest]
    #[case(0.05, false)]
    #[case(1.0, true)]
    fn too_few_filled_bins_withholds_arrays(#[case] amplitude: f32, #[case] expect_data: bool) {
        let mut stat = BinStat::new(1.0, 16);
        let tx = ramp(100, amplitude);
        let out = stat.extract(&tx, &tx).unwrap();
        assert_eq!(out.training_arrays().is_some(), expect_data);
        assert_eq!(out.n_per_bin.map(|v| v.len()), Some(16));
    }

    #[test]
    fn samples_beyond_peak_are_ignored() {
        let mut stat = BinStat::new(0.5, 4);
        let tx = ramp(100, 1.0);
        let out = stat.extract(&tx, &tx).unwrap();
        let total: usize = out.n_per_bin.unwrap().iter().sum();
        assert_eq!(total, 50);
    }

    #[test]
    fn mismatched_lengths_error() {
        let mut stat = BinStat::new(1.0, 4);
        assert!(stat.extract(&ramp(3, 1.0), &ramp(4, 1.0)).is_err());
    }
}
