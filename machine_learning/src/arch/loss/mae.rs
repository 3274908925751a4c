use ndarray::{Array3, ArrayView3};

use super::{LossFn, Metric};

/// Mean absolute error, usable both as a loss and as an evaluation metric.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mae;

impl Metric for Mae {
    fn name(&self) -> &'static str {
        "mae"
    }

    fn measure(&self, y_pred: ArrayView3<f32>, y: ArrayView3<f32>) -> f32 {
        (&y_pred - &y).mapv(f32::abs).mean().unwrap_or_default()
    }
}

impl LossFn for Mae {
    fn loss_prime(&self, y_pred: ArrayView3<f32>, y: ArrayView3<f32>) -> Array3<f32> {
        let n = y_pred.len().max(1) as f32;
        (&y_pred - &y).mapv(|d| if d == 0.0 { 0.0 } else { d.signum() / n })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subgradient_is_zero_on_exact_match() {
        let pred = Array3::from_shape_vec((1, 3, 1), vec![2.0, 0.0, -1.0]).unwrap();
        let y = Array3::zeros((1, 3, 1));

        assert_eq!(Mae.measure(pred.view(), y.view()), 1.0);
        let grad = Mae.loss_prime(pred.view(), y.view());
        assert_eq!(grad[[0, 1, 0]], 0.0);
        assert!((grad[[0, 0, 0]] - 1.0 / 3.0).abs() < 1e-6);
        assert!((grad[[0, 2, 0]] + 1.0 / 3.0).abs() < 1e-6);
    }
}
