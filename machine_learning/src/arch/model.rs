use std::collections::BTreeMap;

use ndarray::{Array3, ArrayD, ArrayView3};

use super::Parameter;
use crate::Result;

/// A model's parameters keyed by name.
pub type StateDict = BTreeMap<String, ArrayD<f32>>;

/// The output of a forward pass.
#[derive(Debug, Clone)]
pub enum Forward {
    /// The prediction, shaped `[batch, time, channel]`.
    Output(Array3<f32>),
    /// The prediction plus the model's attention weights.
    WithAttention(Array3<f32>, ArrayD<f32>),
}

impl Forward {
    /// Discards the attention weights, if any.
    pub fn into_output(self) -> Array3<f32> {
        match self {
            Forward::Output(output) | Forward::WithAttention(output, _) => output,
        }
    }
}

/// A sequence forecasting model as seen by the training loop.
///
/// Gradients accumulate into each `Parameter`'s gradient buffer on `backward`;
/// updating the values is left to an `Optimizer`.
pub trait TrainableModel: Send {
    /// Computes a prediction for a batch.
    ///
    /// # Arguments
    /// * `x` - The encoder input, `[batch, seq_len, channel]`.
    /// * `x_mark` - The encoder input's time features.
    /// * `dec_inp` - The decoder input, `[batch, label_len + pred_len, channel]`.
    /// * `y_mark` - The decoder input's time features.
    ///
    /// # Returns
    /// The model's forward output or an error if the shapes are invalid.
    fn forward(
        &mut self,
        x: ArrayView3<f32>,
        x_mark: ArrayView3<f32>,
        dec_inp: ArrayView3<f32>,
        y_mark: ArrayView3<f32>,
    ) -> Result<Forward>;

    /// Backpropagates the gradient of the loss with respect to the last
    /// training forward pass' output.
    ///
    /// # Arguments
    /// * `d_out` - Shaped like the last output.
    ///
    /// # Returns
    /// `MlErr::MissingForward` if no training forward pass preceded this call.
    fn backward(&mut self, d_out: ArrayView3<f32>) -> Result<()>;

    fn parameters(&self) -> &[Parameter];

    fn parameters_mut(&mut self) -> &mut [Parameter];

    /// Switches between training (`true`) and evaluation (`false`) mode.
    fn set_training(&mut self, training: bool);

    fn is_training(&self) -> bool;

    /// Returns a copy of every parameter's value keyed by name.
    fn state_dict(&self) -> StateDict {
        self.parameters()
            .iter()
            .map(|p| (p.name().to_string(), p.value().clone()))
            .collect()
    }

    fn get_parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters().iter().find(|p| p.name() == name)
    }

    fn get_parameter_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.parameters_mut().iter_mut().find(|p| p.name() == name)
    }

    fn zero_grad(&mut self) {
        self.parameters_mut().iter_mut().for_each(Parameter::zero_grad);
    }

    /// Returns the amount of scalar parameters in the model.
    fn size(&self) -> usize {
        self.parameters().iter().map(Parameter::len).sum()
    }
}

impl<M: TrainableModel + ?Sized> TrainableModel for Box<M> {
    fn forward(
        &mut self,
        x: ArrayView3<f32>,
        x_mark: ArrayView3<f32>,
        dec_inp: ArrayView3<f32>,
        y_mark: ArrayView3<f32>,
    ) -> Result<Forward> {
        (**self).forward(x, x_mark, dec_inp, y_mark)
    }

    fn backward(&mut self, d_out: ArrayView3<f32>) -> Result<()> {
        (**self).backward(d_out)
    }

    fn parameters(&self) -> &[Parameter] {
        (**self).parameters()
    }

    fn parameters_mut(&mut self) -> &mut [Parameter] {
        (**self).parameters_mut()
    }

    fn set_training(&mut self, training: bool) {
        (**self).set_training(training)
    }

    fn is_training(&self) -> bool {
        (**self).is_training()
    }
}
