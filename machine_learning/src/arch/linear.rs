use ndarray::{Array1, Array2, Array3, ArrayView3, Ix1, Ix2};
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{Forward, Parameter, TrainableModel, projection};
use crate::{MlErr, Result};

const WEIGHT: &str = "projection.weight";
const BIAS: &str = "projection.bias";

/// A single temporal projection from `seq_len` to `pred_len`, shared across channels.
pub struct Linear {
    params: Vec<Parameter>,
    training: bool,
    last_input: Option<Array3<f32>>,
}

impl Linear {
    /// Creates a new `Linear` model.
    ///
    /// # Arguments
    /// * `seq_len` - The length of the encoder input.
    /// * `pred_len` - The forecast horizon.
    /// * `seed` - Seeds the uniform parameter initialization.
    ///
    /// # Returns
    /// A new `Linear` instance in training mode.
    pub fn new(seq_len: usize, pred_len: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let bound = 1.0 / (seq_len as f32).sqrt();

        let weight = Array2::from_shape_simple_fn((pred_len, seq_len), || {
            rng.random_range(-bound..=bound)
        });
        let bias = Array1::from_shape_simple_fn(pred_len, || rng.random_range(-bound..=bound));

        Self {
            params: vec![
                Parameter::new(WEIGHT, weight.into_dyn()),
                Parameter::new(BIAS, bias.into_dyn()),
            ],
            training: true,
            last_input: None,
        }
    }
}

impl TrainableModel for Linear {
    fn forward(
        &mut self,
        x: ArrayView3<f32>,
        _x_mark: ArrayView3<f32>,
        _dec_inp: ArrayView3<f32>,
        _y_mark: ArrayView3<f32>,
    ) -> Result<Forward> {
        let weight = self.params[0].value().view().into_dimensionality::<Ix2>()?;
        let bias = self.params[1].value().view().into_dimensionality::<Ix1>()?;
        let out = projection::project(weight, bias, x)?;

        self.last_input = self.training.then(|| x.to_owned());
        Ok(Forward::Output(out))
    }

    fn backward(&mut self, d_out: ArrayView3<f32>) -> Result<()> {
        let x = self.last_input.as_ref().ok_or(MlErr::MissingForward)?;

        let (weight, bias) = self.params.split_at_mut(1);
        let weight_grad = weight[0].grad_mut().view_mut().into_dimensionality::<Ix2>()?;
        let bias_grad = bias[0].grad_mut().view_mut().into_dimensionality::<Ix1>()?;

        projection::project_backward(weight_grad, bias_grad, x.view(), d_out)
    }

    fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut [Parameter] {
        &mut self.params
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
        if !training {
            self.last_input = None;
        }
    }

    fn is_training(&self) -> bool {
        self.training
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zeros(shape: (usize, usize, usize)) -> Array3<f32> {
        Array3::zeros(shape)
    }

    #[test]
    fn same_seed_same_parameters() {
        let a = Linear::new(8, 4, 7);
        let b = Linear::new(8, 4, 7);

        assert_eq!(a.state_dict(), b.state_dict());
        assert_eq!(a.size(), 8 * 4 + 4);
    }

    #[test]
    fn output_has_forecast_shape() {
        let mut model = Linear::new(8, 4, 0);
        let x = zeros((3, 8, 2));
        let mark = zeros((3, 8, 1));
        let dec = zeros((3, 6, 2));

        let out = model
            .forward(x.view(), mark.view(), dec.view(), mark.view())
            .unwrap()
            .into_output();

        assert_eq!(out.dim(), (3, 4, 2));
    }

    #[test]
    fn backward_without_forward_fails() {
        let mut model = Linear::new(4, 2, 0);
        let d_out = zeros((1, 2, 1));

        assert!(matches!(
            model.backward(d_out.view()),
            Err(MlErr::MissingForward)
        ));
    }

    #[test]
    fn eval_mode_does_not_cache_input() {
        let mut model = Linear::new(4, 2, 0);
        model.set_training(false);
        let x = zeros((1, 4, 1));

        model.forward(x.view(), x.view(), x.view(), x.view()).unwrap();

        assert!(model.backward(zeros((1, 2, 1)).view()).is_err());
    }
}
