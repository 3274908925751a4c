use std::{fmt, io};

use machine_learning::MlErr;
use worker::WorkerErr;

/// All errors that can occur in the orchestrator.
#[derive(Debug)]
pub enum OrchestratorError {
    /// Invalid configuration, caught before any replica starts.
    InvalidConfig(String),
    /// The dataset could not be loaded or windowed.
    Data(MlErr),
    /// A replica produced an unrecoverable error during training.
    WorkerError { rank: usize, source: WorkerErr },
    /// A replica task panicked or was cancelled.
    Join(String),
    /// An underlying I/O error not covered by the above variants.
    Io(io::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Data(e) => write!(f, "data error: {e}"),
            Self::WorkerError { rank, source } => write!(f, "replica {rank} error: {source}"),
            Self::Join(msg) => write!(f, "replica task failed: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Data(e) => Some(e),
            Self::WorkerError { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for OrchestratorError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<MlErr> for OrchestratorError {
    fn from(e: MlErr) -> Self {
        Self::Data(e)
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidConfig(e.to_string())
    }
}
