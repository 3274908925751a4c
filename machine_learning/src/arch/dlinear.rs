use ndarray::{Array1, Array2, Array3, ArrayView3, Axis, Ix1, Ix2};
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{Forward, Parameter, TrainableModel, projection};
use crate::{MlErr, Result};

const SEASONAL_WEIGHT: &str = "seasonal.weight";
const SEASONAL_BIAS: &str = "seasonal.bias";
const TREND_WEIGHT: &str = "trend.weight";
const TREND_BIAS: &str = "trend.bias";

/// Splits the input into a moving-average trend and its seasonal remainder,
/// then projects each part over time and adds them.
pub struct DLinear {
    kernel: usize,
    params: Vec<Parameter>,
    training: bool,
    last_parts: Option<(Array3<f32>, Array3<f32>)>,
}

impl DLinear {
    /// Creates a new `DLinear` model.
    ///
    /// # Arguments
    /// * `seq_len` - The length of the encoder input.
    /// * `pred_len` - The forecast horizon.
    /// * `moving_avg` - The trend kernel size, must be odd.
    /// * `seed` - Seeds the bias initialization.
    ///
    /// # Returns
    /// A new `DLinear` instance or an error if the kernel is even or zero.
    pub fn new(seq_len: usize, pred_len: usize, moving_avg: usize, seed: u64) -> Result<Self> {
        if moving_avg % 2 == 0 {
            return Err(MlErr::InvalidArgument(format!(
                "moving average kernel must be odd, got {moving_avg}"
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let bound = 1.0 / (seq_len as f32).sqrt();
        let mut bias = || Array1::from_shape_simple_fn(pred_len, || rng.random_range(-bound..=bound));
        let seasonal_bias = bias();
        let trend_bias = bias();
        let weight = || Array2::from_elem((pred_len, seq_len), 1.0 / seq_len as f32);

        Ok(Self {
            kernel: moving_avg,
            params: vec![
                Parameter::new(SEASONAL_WEIGHT, weight().into_dyn()),
                Parameter::new(SEASONAL_BIAS, seasonal_bias.into_dyn()),
                Parameter::new(TREND_WEIGHT, weight().into_dyn()),
                Parameter::new(TREND_BIAS, trend_bias.into_dyn()),
            ],
            training: true,
            last_parts: None,
        })
    }

    /// Decomposes `x` into `(seasonal, trend)`.
    ///
    /// The trend is a moving average over time with the series' first and last
    /// values repeated as padding, so it keeps the input's length.
    pub fn decompose(&self, x: ArrayView3<f32>) -> (Array3<f32>, Array3<f32>) {
        let (_, seq_len, _) = x.dim();
        let half = (self.kernel - 1) / 2;
        let mut trend = Array3::zeros(x.raw_dim());

        for t in 0..seq_len {
            let mut acc = trend.index_axis_mut(Axis(1), t);
            for k in 0..self.kernel {
                let src = (t + k).saturating_sub(half).min(seq_len - 1);
                acc += &x.index_axis(Axis(1), src);
            }
            acc /= self.kernel as f32;
        }

        let seasonal = &x - &trend;
        (seasonal, trend)
    }
}

impl TrainableModel for DLinear {
    fn forward(
        &mut self,
        x: ArrayView3<f32>,
        _x_mark: ArrayView3<f32>,
        _dec_inp: ArrayView3<f32>,
        _y_mark: ArrayView3<f32>,
    ) -> Result<Forward> {
        if x.dim().1 == 0 {
            return Err(MlErr::InvalidArgument("empty input window".into()));
        }

        let (seasonal, trend) = self.decompose(x);

        let weight = |i: usize| self.params[i].value().view().into_dimensionality::<Ix2>();
        let bias = |i: usize| self.params[i].value().view().into_dimensionality::<Ix1>();

        let mut out = projection::project(weight(0)?, bias(1)?, seasonal.view())?;
        out += &projection::project(weight(2)?, bias(3)?, trend.view())?;

        self.last_parts = self.training.then_some((seasonal, trend));
        Ok(Forward::Output(out))
    }

    fn backward(&mut self, d_out: ArrayView3<f32>) -> Result<()> {
        let (seasonal, trend) = self.last_parts.as_ref().ok_or(MlErr::MissingForward)?;

        for (chunk, part) in self.params.chunks_mut(2).zip([seasonal, trend]) {
            let [weight, bias] = chunk else {
                continue;
            };
            let weight_grad = weight.grad_mut().view_mut().into_dimensionality::<Ix2>()?;
            let bias_grad = bias.grad_mut().view_mut().into_dimensionality::<Ix1>()?;
            projection::project_backward(weight_grad, bias_grad, part.view(), d_out)?;
        }

        Ok(())
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
            self.last_parts = None;
        }
    }

    fn is_training(&self) -> bool {
        self.training
    }
}
