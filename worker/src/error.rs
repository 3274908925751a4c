use std::{error::Error, fmt, io};

use comms::CommsErr;
use machine_learning::MlErr;

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, WorkerErr>;

/// Replica runtime failures.
#[derive(Debug)]
pub enum WorkerErr {
    Io(io::Error),
    Comms(CommsErr),
    Ml(MlErr),
    /// The run configuration is invalid, raised before any training starts.
    Config(String),
    Checkpoint(String),
    /// Replicas disagree on how many training batches an epoch has.
    UnevenShards {
        rank: usize,
        local: usize,
        min: usize,
        max: usize,
    },
    /// The scored part of a model's output doesn't match the target's.
    ShapeMismatch {
        got: (usize, usize, usize),
        expected: (usize, usize, usize),
    },
    /// A stream that must yield batches yielded none.
    EmptyStream(&'static str),
    Tracking(String),
}

impl fmt::Display for WorkerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerErr::Io(e) => write!(f, "io error: {e}"),
            WorkerErr::Comms(e) => write!(f, "collective error: {e}"),
            WorkerErr::Ml(e) => write!(f, "machine learning error: {e}"),
            WorkerErr::Config(detail) => write!(f, "invalid configuration: {detail}"),
            WorkerErr::Checkpoint(detail) => write!(f, "checkpoint error: {detail}"),
            WorkerErr::UnevenShards {
                rank,
                local,
                min,
                max,
            } => write!(
                f,
                "replica {rank} has {local} train batches, replicas range from {min} to {max}"
            ),
            WorkerErr::ShapeMismatch { got, expected } => write!(
                f,
                "model output scores as {got:?}, the target as {expected:?}"
            ),
            WorkerErr::EmptyStream(which) => write!(f, "the {which} stream yielded no batches"),
            WorkerErr::Tracking(detail) => write!(f, "tracking error: {detail}"),
        }
    }
}

impl Error for WorkerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WorkerErr::Io(e) => Some(e),
            WorkerErr::Comms(e) => Some(e),
            WorkerErr::Ml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WorkerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<CommsErr> for WorkerErr {
    fn from(value: CommsErr) -> Self {
        Self::Comms(value)
    }
}

impl From<MlErr> for WorkerErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<safetensors::SafeTensorError> for WorkerErr {
    fn from(value: safetensors::SafeTensorError) -> Self {
        Self::Checkpoint(value.to_string())
    }
}

impl From<serde_json::Error> for WorkerErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Tracking(value.to_string())
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<WorkerErr> for io::Error {
    fn from(value: WorkerErr) -> Self {
        match value {
            WorkerErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
