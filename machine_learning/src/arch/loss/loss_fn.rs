use ndarray::{Array3, ArrayView3};

/// A scalar measure of how far a prediction is from its target.
pub trait Metric: Send + Sync {
    /// The metric's lowercase name, as used in exported metric keys.
    fn name(&self) -> &'static str;

    fn measure(&self, y_pred: ArrayView3<f32>, y: ArrayView3<f32>) -> f32;
}

/// A differentiable `Metric` that can drive training.
pub trait LossFn: Metric {
    fn loss(&self, y_pred: ArrayView3<f32>, y: ArrayView3<f32>) -> f32 {
        self.measure(y_pred, y)
    }

    /// The gradient of the loss with respect to `y_pred`.
    fn loss_prime(&self, y_pred: ArrayView3<f32>, y: ArrayView3<f32>) -> Array3<f32>;
}
