//! Simulated transmitter and signal-processing collaborators.
//!
//! Everything here is deterministic: the same config and command sequence
//! always yields the same captures, coefficients and plots.
pub mod agc;
pub mod error;
pub mod model;
mod plot;
pub mod stats;
pub mod transmitter;

pub use agc::SimAgc;
pub use error::SimError;
pub use model::PolyModel;
pub use stats::{BinStat, BinStatFactory};
pub use transmitter::{SimMeasure, SimTransmitter};

/// Median of `values`; zero for an empty slice.
pub(crate) fn median(mut values: Vec<f32>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (f64::from(values[mid - 1]) + f64::from(values[mid])) / 2.0
    } else {
        f64::from(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::median;

    #[test]
    fn median_odd_even_empty() {
        assert_eq!(median(vec![3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(vec![4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(Vec::new()), 0.0);
    }
}
