use ndarray::ArrayView3;

use super::{LossFn, Mae, Metric, Mse};
use crate::{MlErr, Result};

/// Root mean squared error.
#[derive(Debug, Default, Clone, Copy)]
pub struct Rmse;

impl Metric for Rmse {
    fn name(&self) -> &'static str {
        "rmse"
    }

    fn measure(&self, y_pred: ArrayView3<f32>, y: ArrayView3<f32>) -> f32 {
        Mse.measure(y_pred, y).sqrt()
    }
}

/// Mean absolute percentage error. Targets equal to zero are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mape;

impl Metric for Mape {
    fn name(&self) -> &'static str {
        "mape"
    }

    fn measure(&self, y_pred: ArrayView3<f32>, y: ArrayView3<f32>) -> f32 {
        let (sum, count) = y_pred
            .iter()
            .zip(y.iter())
            .filter(|&(_, &t)| t != 0.0)
            .fold((0.0, 0usize), |(sum, count), (&p, &t)| {
                (sum + ((p - t) / t).abs(), count + 1)
            });

        if count == 0 { 0.0 } else { sum / count as f32 }
    }
}

/// Resolves a training loss by name, ignoring case.
///
/// # Errors
/// `MlErr::UnknownLoss` if the name is not a differentiable loss.
pub fn get_loss_function(name: &str) -> Result<Box<dyn LossFn>> {
    match name.to_ascii_lowercase().as_str() {
        "mse" => Ok(Box::new(Mse)),
        "mae" => Ok(Box::new(Mae)),
        _ => Err(MlErr::UnknownLoss(name.to_string())),
    }
}

/// Resolves an evaluation metric by name, ignoring case.
///
/// # Errors
/// `MlErr::UnknownMetric` if the name is not a known metric.
pub fn get_metric_function(name: &str) -> Result<Box<dyn Metric>> {
    match name.to_ascii_lowercase().as_str() {
        "mse" => Ok(Box::new(Mse)),
        "mae" => Ok(Box::new(Mae)),
        "rmse" => Ok(Box::new(Rmse)),
        "mape" => Ok(Box::new(Mape)),
        _ => Err(MlErr::UnknownMetric(name.to_string())),
    }
}
