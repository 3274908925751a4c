use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::{DLinear, Linear, TrainableModel};
use crate::{MlErr, Result};

/// The model families the crate knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelKind {
    Linear,
    DLinear,
}

impl FromStr for ModelKind {
    type Err = MlErr;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "dlinear" => Ok(Self::DLinear),
            _ => Err(MlErr::UnknownModel(s.to_string())),
        }
    }
}

impl TryFrom<String> for ModelKind {
    type Error = MlErr;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ModelKind> for String {
    fn from(kind: ModelKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Linear => write!(f, "Linear"),
            ModelKind::DLinear => write!(f, "DLinear"),
        }
    }
}

/// Shape and initialization settings shared by every model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    pub seq_len: usize,
    pub pred_len: usize,
    pub enc_in: usize,
    pub moving_avg: usize,
    pub output_attention: bool,
    pub seed: u64,
}

pub struct ModelBuilder;

impl ModelBuilder {
    /// Builds a model of the given family.
    ///
    /// # Args
    /// * `kind` - Which model to build.
    /// * `spec` - Shape and seed for the model's parameters.
    ///
    /// # Returns
    /// A boxed model in training mode.
    ///
    /// # Errors
    /// Returns `MlErr::InvalidArgument` for zero-sized windows or an invalid
    /// moving average kernel.
    pub fn build(kind: ModelKind, spec: &ModelSpec) -> Result<Box<dyn TrainableModel>> {
        if spec.seq_len == 0 || spec.pred_len == 0 {
            return Err(MlErr::InvalidArgument(format!(
                "seq_len and pred_len must be positive, got {} and {}",
                spec.seq_len, spec.pred_len
            )));
        }

        let model: Box<dyn TrainableModel> = match kind {
            ModelKind::Linear => Box::new(Linear::new(spec.seq_len, spec.pred_len, spec.seed)),
            ModelKind::DLinear => Box::new(DLinear::new(
                spec.seq_len,
                spec.pred_len,
                spec.moving_avg,
                spec.seed,
            )?),
        };

        Ok(model)
    }
}
