use crate::{Result, arch::Parameter};

/// Updates parameter values from their accumulated gradients.
pub trait Optimizer: Send {
    /// The rate the next `step` will use.
    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, learning_rate: f32);

    /// Applies one update to every parameter that requires a gradient.
    ///
    /// # Errors
    /// Returns `MlErr::SizeMismatch` if the parameter set changed shape since
    /// the optimizer was created.
    fn step(&mut self, params: &mut [Parameter]) -> Result<()>;
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn learning_rate(&self) -> f32 {
        (**self).learning_rate()
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        (**self).set_learning_rate(learning_rate)
    }

    fn step(&mut self, params: &mut [Parameter]) -> Result<()> {
        (**self).step(params)
    }
}
