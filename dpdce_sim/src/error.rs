use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("need at least {need} filled bins, got {got}")]
    TooFewBins { got: usize, need: usize },
    #[error("training arrays differ in length")]
    LengthMismatch,
    #[error("least-squares system is singular")]
    Singular,
    #[error(
        "rx gain {0} dB outside [{min}, {max}]",
        min = crate::agc::RX_GAIN_MIN,
        max = crate::agc::RX_GAIN_MAX
    )]
    RxGainRange(f64),
}

pub type Result<T> = std::result::Result<T, SimError>;
