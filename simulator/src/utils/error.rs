use thiserror::Error;
use wavesim_common::CommonError;

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Malformed grid file: {0}")]
    Format(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("A NaN or Inf value was produced at step {step}")]
    NanOrInf { step: u64 },

    #[error("Failed to write to disk: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to write npy: {0}")]
    Npy(#[from] ndarray_npy::WriteNpyError),

    #[error("Error in common: {err}")]
    Common {
        #[from]
        err: CommonError,
    },

    #[error("Worker panicked: {0}")]
    Panicked(String),
}

impl SimulationError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        SimulationError::Format(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        SimulationError::InvalidArgument(msg.into())
    }
}
