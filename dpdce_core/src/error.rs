use dpdce_traits::BoxError;
use thiserror::Error;

/// Failures that abort a worker phase or the protocol server.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("statistic extraction failed: {0}")]
    Extraction(String),
    #[error("model error: {0}")]
    Model(String),
    #[error("transmitter error: {0}")]
    Transmitter(String),
    #[error("gain control error: {0}")]
    Agc(String),
    #[error("No data to calculate model")]
    NoData,
    #[error("extraction reached {done}/{target} measurements after {rounds} rounds")]
    CaptureBudget {
        done: usize,
        target: usize,
        rounds: usize,
    },
    #[error("artifact error: {0}")]
    Artifact(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("worker panicked: {0}")]
    Panic(String),
}

/// Why a command could not be scheduled.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("busy: a command is already pending")]
    Busy,
    #[error("engine has terminated")]
    Terminated,
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

/// Adapter for collaborator results: wraps the boxed error into the given
/// `EngineError` variant.
///
/// ```ignore
/// let capture = self.measure.get_samples().map_err(collab(EngineError::Capture))?;
/// ```
pub(crate) fn collab(kind: fn(String) -> EngineError) -> impl FnOnce(BoxError) -> Report {
    move |e| Report::new(kind(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collab_wraps_into_variant() {
        let boxed: BoxError = "socket closed".into();
        let report = collab(EngineError::Transmitter)(boxed);
        match report.downcast_ref::<EngineError>() {
            Some(EngineError::Transmitter(msg)) => assert_eq!(msg, "socket closed"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(report.to_string(), "transmitter error: socket closed");
    }

    #[test]
    fn no_data_reads_as_summary_line() {
        assert_eq!(
            format!("Error! {}", EngineError::NoData),
            "Error! No data to calculate model"
        );
    }
}
