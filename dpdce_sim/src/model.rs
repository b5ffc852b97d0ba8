//! Memoryless polynomial predistortion model.
//!
//! The predistorter multiplies each sample by `g(|x|)·exp(j·p(|x|))`, with `g`
//! and `p` polynomials in the input amplitude. Training compares binned TX and
//! RX amplitudes, fits the gain and phase corrections the current predistorter
//! would need, and moves the coefficients part of the way there.
use crate::error::{Result, SimError};
use crate::plot;
use crate::transmitter::poly;
use dpdce_traits::{BoxError, DpdData, Model};
use std::path::Path;

pub const N_COEFS: usize = 5;
const PLOT_POINTS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct PolyModel {
    coefs_am: Vec<f32>,
    coefs_pm: Vec<f32>,
}

impl Default for PolyModel {
    fn default() -> Self {
        let mut coefs_am = vec![0.0; N_COEFS];
        coefs_am[0] = 1.0;
        Self {
            coefs_am,
            coefs_pm: vec![0.0; N_COEFS],
        }
    }
}

impl PolyModel {
    fn fit(&self, tx: &[f32], rx: &[f32], phase_diff: &[f32]) -> Result<(Vec<f32>, Vec<f32>)> {
        if tx.len() != rx.len() || tx.len() != phase_diff.len() {
            return Err(SimError::LengthMismatch);
        }
        let points: Vec<usize> = (0..tx.len()).filter(|&i| rx[i] > 0.0 && tx[i] > 0.0).collect();
        if points.len() < 2 {
            return Err(SimError::TooFewBins {
                got: points.len(),
                need: 2,
            });
        }
        // Normalize the feedback path to unity small-signal gain.
        let lowest = points[0];
        let norm = tx[lowest] / rx[lowest];

        let xs: Vec<f64> = points.iter().map(|&i| f64::from(tx[i])).collect();
        let am_target: Vec<f64> = points
            .iter()
            .map(|&i| {
                let have = poly(&self.coefs_am, tx[i]);
                f64::from(have * tx[i] / (rx[i] * norm))
            })
            .collect();
        let pm_target: Vec<f64> = points
            .iter()
            .map(|&i| f64::from(poly(&self.coefs_pm, tx[i]) - phase_diff[i]))
            .collect();

        let degree = N_COEFS.min(points.len());
        Ok((
            pad(least_squares(&xs, &am_target, degree)?),
            pad(least_squares(&xs, &pm_target, degree)?),
        ))
    }
}

fn pad(mut c: Vec<f32>) -> Vec<f32> {
    c.resize(N_COEFS, 0.0);
    c
}

/// Polynomial least squares via the normal equations.
fn least_squares(xs: &[f64], ys: &[f64], n: usize) -> Result<Vec<f32>> {
    let mut a = vec![vec![0.0f64; n + 1]; n];
    for (&x, &y) in xs.iter().zip(ys) {
        let pows: Vec<f64> = (0..n).map(|k| x.powi(k as i32)).collect();
        for r in 0..n {
            for c in 0..n {
                a[r][c] += pows[r] * pows[c];
            }
            a[r][n] += pows[r] * y;
        }
    }
    solve(a).map(|v| v.into_iter().map(|c| c as f32).collect())
}

/// Gaussian elimination with partial pivoting on an augmented `n × (n+1)` matrix.
fn solve(mut a: Vec<Vec<f64>>) -> Result<Vec<f64>> {
    let n = a.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .ok_or(SimError::Singular)?;
        if a[pivot][col].abs() < 1e-12 {
            return Err(SimError::Singular);
        }
        a.swap(col, pivot);
        for row in col + 1..n {
            let f = a[row][col] / a[col][col];
            for k in col..=n {
                a[row][k] -= f * a[col][k];
            }
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (a[row][n] - tail) / a[row][row];
    }
    Ok(x)
}

fn blend(old: &mut [f32], new: &[f32], lr: f32) {
    for (o, n) in old.iter_mut().zip(new) {
        *o += lr * (n - *o);
    }
}

impl Model for PolyModel {
    fn train(
        &mut self,
        tx: &[f32],
        rx: &[f32],
        phase_diff: &[f32],
        lr: f64,
    ) -> std::result::Result<(), BoxError> {
        let (am, pm) = self.fit(tx, rx, phase_diff)?;
        let lr = lr.clamp(0.0, 1.0) as f32;
        blend(&mut self.coefs_am, &am, lr);
        blend(&mut self.coefs_pm, &pm, lr);
        tracing::debug!(lr, am = ?self.coefs_am, pm = ?self.coefs_pm, "model updated");
        Ok(())
    }

    fn dpd_data(&self) -> DpdData {
        DpdData::Poly {
            coefs_am: self.coefs_am.clone(),
            coefs_pm: self.coefs_pm.clone(),
        }
    }

    fn reset_coefs(&mut self) {
        *self = Self::default();
    }

    fn plot(
        &self,
        am_path: &Path,
        pm_path: &Path,
        label: &str,
    ) -> std::result::Result<(), BoxError> {
        let rs = (0..=PLOT_POINTS).map(|i| i as f32 / PLOT_POINTS as f32);
        let am: Vec<(f32, f32)> = rs.clone().map(|r| (r, r * poly(&self.coefs_am, r))).collect();
        let pm: Vec<(f32, f32)> = rs.map(|r| (r, poly(&self.coefs_pm, r))).collect();
        tracing::debug!(label, "plotting model");
        plot::draw(am_path, &[am], &[])?;
        plot::draw(pm_path, &[pm], &[])
    }
}
