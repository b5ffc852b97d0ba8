//! Predistorter parameter representation.

use num_complex::Complex32;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Predistortion parameters as held by the transmitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DpdData {
    /// Odd-order polynomial coefficients for the amplitude and phase paths.
    Poly {
        coefs_am: Vec<f32>,
        coefs_pm: Vec<f32>,
    },
    /// Amplitude-indexed lookup table.
    Lut {
        scalefactor: f32,
        table: Vec<Complex32>,
    },
}

impl Default for DpdData {
    /// Identity polynomial: unity gain, no phase correction.
    fn default() -> Self {
        DpdData::Poly {
            coefs_am: vec![1.0, 0.0, 0.0, 0.0, 0.0],
            coefs_pm: vec![0.0; 5],
        }
    }
}

impl fmt::Display for DpdData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DpdData::Poly { coefs_am, coefs_pm } => {
                write!(f, "dpd_coefs=poly, am=[")?;
                write_list(f, coefs_am)?;
                write!(f, "], pm=[")?;
                write_list(f, coefs_pm)?;
                write!(f, "]")
            }
            DpdData::Lut { scalefactor, table } => {
                write!(f, "dpd_coefs=lut, scalefactor={scalefactor}, lut=[")?;
                for (i, c) in table.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}{:+}j", c.re, c.im)?;
                }
                write!(f, "]")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, xs: &[f32]) -> fmt::Result {
    for (i, x) in xs.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{x}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_identity_poly() {
        match DpdData::default() {
            DpdData::Poly { coefs_am, coefs_pm } => {
                assert_eq!(coefs_am[0], 1.0);
                assert!(coefs_am[1..].iter().all(|c| *c == 0.0));
                assert!(coefs_pm.iter().all(|c| *c == 0.0));
            }
            other => panic!("expected poly, got {other:?}"),
        }
    }

    #[test]
    fn serializes_with_type_tag() {
        let lut = DpdData::Lut {
            scalefactor: 2.0,
            table: vec![Complex32::new(1.0, -0.5)],
        };
        let v = serde_json::to_value(&lut).unwrap();
        assert_eq!(v["type"], "lut");
        assert_eq!(v["scalefactor"], 2.0);

        let poly = serde_json::to_value(DpdData::default()).unwrap();
        assert_eq!(poly["type"], "poly");
        assert_eq!(poly["coefs_am"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn display_names_the_variant() {
        assert!(DpdData::default().to_string().starts_with("dpd_coefs=poly"));
        let lut = DpdData::Lut {
            scalefactor: 1.5,
            table: vec![Complex32::new(1.0, 0.25)],
        };
        assert_eq!(lut.to_string(), "dpd_coefs=lut, scalefactor=1.5, lut=[1+0.25j]");
    }
}
