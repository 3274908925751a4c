use machine_learning::data::Features;
use ndarray::{Array3, ArrayView3, Ix3, s};

use crate::{Result, WorkerErr};

/// How a batch's target turns into the decoder input and which part of the
/// prediction is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastWindow {
    label_len: usize,
    pred_len: usize,
    features: Features,
}

impl ForecastWindow {
    pub fn new(label_len: usize, pred_len: usize, features: Features) -> Self {
        Self {
            label_len,
            pred_len,
            features,
        }
    }

    /// Builds the decoder input: the first `label_len` steps of `y` followed by
    /// `pred_len` zero steps.
    ///
    /// # Errors
    /// `WorkerErr::Config` if `y` is shorter than `label_len`.
    pub fn decoder_input(&self, y: ArrayView3<f32>) -> Result<Array3<f32>> {
        let (batch, steps, channels) = y.dim();
        if steps < self.label_len {
            return Err(WorkerErr::Config(format!(
                "target has {steps} steps, fewer than label_len {}",
                self.label_len
            )));
        }

        let mut dec_inp = Array3::zeros((batch, self.label_len + self.pred_len, channels));
        dec_inp
            .slice_mut(s![.., ..self.label_len, ..])
            .assign(&y.slice(s![.., ..self.label_len, ..]));

        Ok(dec_inp)
    }

    fn first_channel(&self, channels: usize) -> usize {
        match self.features {
            Features::MS => channels.saturating_sub(1),
            Features::M | Features::S => 0,
        }
    }

    /// The scored part of a prediction or target: the last `pred_len` steps and,
    /// for `Features::MS`, only the last channel.
    pub fn scored<'a>(&self, t: ArrayView3<'a, f32>) -> ArrayView3<'a, f32> {
        let (_, steps, channels) = t.dim();
        let start = steps.saturating_sub(self.pred_len);
        let first = self.first_channel(channels);

        t.slice_move(s![.., start.., first..])
    }

    /// Scores a prediction against its target.
    ///
    /// # Returns
    /// The scored parts of `pred` and `target`, in that order.
    ///
    /// # Errors
    /// `WorkerErr::ShapeMismatch` if the two parts differ in shape, such as a
    /// model forecasting fewer than `pred_len` steps.
    pub fn scored_pair<'a>(
        &self,
        pred: ArrayView3<'a, f32>,
        target: ArrayView3<'a, f32>,
    ) -> Result<(ArrayView3<'a, f32>, ArrayView3<'a, f32>)> {
        let pred = self.scored(pred);
        let target = self.scored(target);

        if pred.dim() != target.dim() {
            return Err(WorkerErr::ShapeMismatch {
                got: pred.dim(),
                expected: target.dim(),
            });
        }
        Ok((pred, target))
    }

    /// Places the gradient of the scored part back into a zero gradient shaped
    /// like the full prediction.
    pub fn expand_grad(&self, d_scored: ArrayView3<f32>, full: Ix3) -> Array3<f32> {
        let (_, steps, channels) = (full[0], full[1], full[2]);
        let start = steps.saturating_sub(self.pred_len);
        let first = self.first_channel(channels);

        let mut d_out = Array3::zeros(full);
        d_out
            .slice_mut(s![.., start.., first..])
            .assign(&d_scored);
        d_out
    }

    pub fn label_len(&self) -> usize {
        self.label_len
    }

    pub fn pred_len(&self) -> usize {
        self.pred_len
    }
}
