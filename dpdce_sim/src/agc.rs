//! RX automatic gain control for the simulated feedback path.
use crate::error::SimError;
use crate::transmitter::SimTransmitter;
use dpdce_traits::{Adapt, Agc, BoxError};

pub const RX_GAIN_MIN: f64 = 0.0;
pub const RX_GAIN_MAX: f64 = 60.0;

/// Relative RX median error accepted without touching the gain.
const TOLERANCE: f64 = 0.05;

/// One trial measures the RX median and moves the RX gain toward the target.
pub struct SimAgc {
    tx: SimTransmitter,
    target: f64,
}

impl SimAgc {
    pub fn new(tx: SimTransmitter, target_rx_median: f64) -> Self {
        Self {
            tx,
            target: target_rx_median,
        }
    }
}

impl Agc for SimAgc {
    fn run(&mut self) -> Result<(bool, String), BoxError> {
        let m = self.tx.capture().rx_median;
        if m <= 0.0 {
            return Ok((false, "no RX signal".to_string()));
        }
        if (m / self.target - 1.0).abs() <= TOLERANCE {
            return Ok((
                true,
                format!("RX median {m:.4} on target {:.4}", self.target),
            ));
        }

        let old = self.tx.get_rxgain()?;
        let new = old + 20.0 * (self.target / m).log10();
        if !(RX_GAIN_MIN..=RX_GAIN_MAX).contains(&new) {
            let clamped = new.clamp(RX_GAIN_MIN, RX_GAIN_MAX);
            self.tx.set_rxgain(clamped)?;
            tracing::warn!(wanted = new, clamped, "rx gain out of range");
            return Ok((false, SimError::RxGainRange(new).to_string()));
        }
        self.tx.set_rxgain(new)?;
        tracing::debug!(rx_median = m, old, new, "rx gain adjusted");
        Ok((
            true,
            format!("RX median {m:.4}\nRX gain {old:.1} -> {new:.1} dB"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpdce_config::SimCfg;

    #[test]
    fn converges_in_one_step_then_reports_on_target() {
        let tx = SimTransmitter::new(SimCfg::default(), 256, 1_000);
        let mut agc = SimAgc::new(tx.clone(), 0.05);

        let (ok, text) = agc.run().unwrap();
        assert!(ok);
        assert!(text.contains("RX gain"), "{text}");
        let (ok, text) = agc.run().unwrap();
        assert!(ok);
        assert!(text.contains("on target"), "{text}");
    }

    #[test]
    fn unreachable_target_fails_the_trial() {
        let tx = SimTransmitter::new(SimCfg::default(), 256, 1_000);
        let mut agc = SimAgc::new(tx.clone(), 1e6);
        let (ok, text) = agc.run().unwrap();
        assert!(!ok);
        assert!(text.contains("outside"), "{text}");
        assert_eq!(tx.clone().get_rxgain().unwrap(), RX_GAIN_MAX);
    }
}
