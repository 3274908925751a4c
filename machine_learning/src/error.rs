use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    UnknownModel(String),
    UnknownLoss(String),
    UnknownMetric(String),
    UnknownFeatures(String),
    MissingForward,
    InvalidArgument(String),
    Csv {
        line: usize,
        detail: String,
    },
    Io(io::Error),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::UnknownModel(name) => write!(f, "Model {name} not recognized"),
            MlErr::UnknownLoss(name) => write!(f, "Loss function {name} not recognized"),
            MlErr::UnknownMetric(name) => write!(f, "Metric {name} not recognized"),
            MlErr::UnknownFeatures(name) => {
                write!(f, "Feature mode {name} not recognized, expected one of M, S, MS")
            }
            MlErr::MissingForward => {
                write!(f, "Tried to run a backward pass without a training forward pass")
            }
            MlErr::InvalidArgument(detail) => write!(f, "Invalid argument: {detail}"),
            MlErr::Csv { line, detail } => write!(f, "Malformed csv at line {line}: {detail}"),
            MlErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ndarray::ShapeError> for MlErr {
    fn from(value: ndarray::ShapeError) -> Self {
        Self::InvalidArgument(value.to_string())
    }
}
