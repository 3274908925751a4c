use ndarray::{Array3, ArrayView3};

use super::{LossFn, Metric};

/// Mean squared error loss function.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mse;

impl Mse {
    /// Returns a new `Mse`.
    pub fn new() -> Self {
        Self
    }
}

impl Metric for Mse {
    fn name(&self) -> &'static str {
        "mse"
    }

    fn measure(&self, y_pred: ArrayView3<f32>, y: ArrayView3<f32>) -> f32 {
        (&y_pred - &y)
            .mapv(|x| x.powi(2))
            .mean()
            .unwrap_or_default()
    }
}

impl LossFn for Mse {
    fn loss_prime(&self, y_pred: ArrayView3<f32>, y: ArrayView3<f32>) -> Array3<f32> {
        (&y_pred - &y) * (2.0 / y_pred.len().max(1) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn squares_the_error() {
        let pred = Array3::from_shape_vec((1, 2, 1), vec![1.0, 3.0]).unwrap();
        let y = Array3::zeros((1, 2, 1));

        assert_eq!(Mse.loss(pred.view(), y.view()), 5.0);
        assert_eq!(
            Mse.loss_prime(pred.view(), y.view()).into_raw_vec_and_offset().0,
            vec![1.0, 3.0]
        );
    }
}
