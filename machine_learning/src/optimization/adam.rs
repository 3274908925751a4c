use ndarray::{ArrayD, Zip};

use super::Optimizer;
use crate::{MlErr, Result, arch::Parameter};

#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    beta1_t: f32,
    beta2_t: f32,
    v: Vec<ArrayD<f32>>,
    s: Vec<ArrayD<f32>>,
    epsilon: f32,
}

impl Adam {
    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `params` - The parameters this instance will update, used to size its moments.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `beta1`, `beta2`, `epsilon` - Hyperparameters to the optimization algorithm.
    ///
    /// # Returns
    /// A new `Adam` instance.
    pub fn new(
        params: &[Parameter],
        learning_rate: f32,
        beta1: f32,
        beta2: f32,
        epsilon: f32,
    ) -> Self {
        let zeros = || params.iter().map(|p| ArrayD::zeros(p.value().raw_dim())).collect();

        Self {
            learning_rate,
            beta1,
            beta2,
            beta1_t: 1.,
            beta2_t: 1.,
            v: zeros(),
            s: zeros(),
            epsilon,
        }
    }

    /// Creates an `Adam` optimizer with the usual `0.9`, `0.999` and `1e-8` hyperparameters.
    pub fn with_defaults(params: &[Parameter], learning_rate: f32) -> Self {
        Self::new(params, learning_rate, 0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    fn step(&mut self, params: &mut [Parameter]) -> Result<()> {
        if params.len() != self.v.len() {
            return Err(MlErr::SizeMismatch {
                what: "optimizer parameters",
                got: params.len(),
                expected: self.v.len(),
            });
        }

        let Self {
            learning_rate: lr,
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            ..
        } = *self;

        self.beta1_t *= b1;
        self.beta2_t *= b2;

        let bc1 = 1. - self.beta1_t;
        let bc2 = 1. - self.beta2_t;
        let step_size = lr * (bc2.sqrt() / bc1);

        for ((param, v), s) in params.iter_mut().zip(&mut self.v).zip(&mut self.s) {
            if !param.requires_grad() {
                continue;
            }

            if param.shape() != v.shape() {
                return Err(MlErr::SizeMismatch {
                    what: "optimizer moments",
                    got: param.len(),
                    expected: v.len(),
                });
            }

            let (value, grad) = param.value_and_grad_mut();
            Zip::from(value)
                .and(grad)
                .and(v)
                .and(s)
                .for_each(|p, &g, v, s| {
                    *v = b1 * *v + (1. - b1) * g;
                    *s = b2 * *s + (1. - b2) * g.powi(2);
                    *p -= step_size * *v / (s.sqrt() + eps);
                });
        }

        Ok(())
    }
}
