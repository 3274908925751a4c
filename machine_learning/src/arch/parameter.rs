use ndarray::{ArrayD, IxDyn};

/// A named, trainable tensor together with its gradient buffer.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    value: ArrayD<f32>,
    grad: ArrayD<f32>,
    requires_grad: bool,
}

impl Parameter {
    /// Creates a new trainable `Parameter` with a zeroed gradient.
    ///
    /// # Arguments
    /// * `name` - The parameter's key in the model's state dict.
    /// * `value` - The initial value.
    ///
    /// # Returns
    /// A new `Parameter` instance.
    pub fn new(name: impl Into<String>, value: ArrayD<f32>) -> Self {
        let grad = ArrayD::zeros(value.raw_dim());

        Self {
            name: name.into(),
            value,
            grad,
            requires_grad: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &ArrayD<f32> {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.value
    }

    pub fn grad(&self) -> &ArrayD<f32> {
        &self.grad
    }

    pub fn grad_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.grad
    }

    /// Splits the parameter into its value and its gradient, for optimizers.
    pub fn value_and_grad_mut(&mut self) -> (&mut ArrayD<f32>, &ArrayD<f32>) {
        (&mut self.value, &self.grad)
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Freezes (`false`) or unfreezes (`true`) this parameter.
    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        self.requires_grad = requires_grad;
    }

    pub fn shape(&self) -> &[usize] {
        self.value.shape()
    }

    /// Returns the amount of scalars in this parameter.
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    /// Builds a zero-initialized parameter of the given shape.
    pub fn zeros(name: impl Into<String>, shape: &[usize]) -> Self {
        Self::new(name, ArrayD::zeros(IxDyn(shape)))
    }
}
