use comms::Collective;
use half::f16;
use log::debug;
use machine_learning::{arch::TrainableModel, optimization::Optimizer};
use ndarray::Array3;

use crate::{Result, coordinator::Coordinator};

const INIT_SCALE: f32 = 65536.0;
const GROWTH_FACTOR: f32 = 2.0;
const BACKOFF_FACTOR: f32 = 0.5;
const GROWTH_INTERVAL: usize = 2000;

/// Whether an optimizer step updated the parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    /// The gradients overflowed, parameters were left untouched.
    Skipped,
}

/// Dynamic loss scaling for half precision training.
#[derive(Debug, Clone, PartialEq)]
pub struct GradScaler {
    scale: f32,
    growth_tracker: usize,
}

impl Default for GradScaler {
    fn default() -> Self {
        Self::new()
    }
}

impl GradScaler {
    pub fn new() -> Self {
        Self {
            scale: INIT_SCALE,
            growth_tracker: 0,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Updates the scale after a step.
    ///
    /// Overflow halves it, `GROWTH_INTERVAL` consecutive clean steps double it.
    fn update(&mut self, overflow: bool) {
        if overflow {
            self.scale *= BACKOFF_FACTOR;
            self.growth_tracker = 0;
            return;
        }

        self.growth_tracker += 1;
        if self.growth_tracker == GROWTH_INTERVAL {
            self.scale *= GROWTH_FACTOR;
            self.growth_tracker = 0;
        }
    }
}

/// The backward and step sequence of a run, fixed at start.
#[derive(Debug, Clone, PartialEq)]
pub enum GradientManager {
    Full,
    Reduced(GradScaler),
}

impl GradientManager {
    pub fn new(use_amp: bool) -> Self {
        if use_amp {
            Self::Reduced(GradScaler::new())
        } else {
            Self::Full
        }
    }

    /// The current loss scale, if scaling.
    pub fn scale(&self) -> Option<f32> {
        match self {
            GradientManager::Full => None,
            GradientManager::Reduced(scaler) => Some(scaler.scale()),
        }
    }

    /// Rounds a forward output to the precision the loss sees.
    pub fn autocast(&self, output: Array3<f32>) -> Array3<f32> {
        match self {
            GradientManager::Full => output,
            GradientManager::Reduced(_) => output.mapv_into(round_half),
        }
    }

    /// Backpropagates `d_out`, scaled by the loss scale in reduced mode.
    pub fn backward(&self, model: &mut dyn TrainableModel, d_out: Array3<f32>) -> Result<()> {
        match self {
            GradientManager::Full => model.backward(d_out.view())?,
            GradientManager::Reduced(scaler) => {
                let scale = scaler.scale();
                let d_out = d_out.mapv_into(|g| round_half(g * scale));
                model.backward(d_out.view())?;

                model
                    .parameters_mut()
                    .iter_mut()
                    .filter(|p| p.requires_grad())
                    .for_each(|p| p.grad_mut().mapv_inplace(round_half));
            }
        }

        Ok(())
    }

    /// Reduces the gradients across replicas and applies the optimizer.
    ///
    /// In reduced mode gradients are unscaled first and the step is skipped if
    /// any of them is not finite. The check runs on all-reduced values so every
    /// replica skips the same steps.
    pub fn step<C: Collective>(
        &mut self,
        model: &mut dyn TrainableModel,
        optimizer: &mut dyn Optimizer,
        coordinator: &Coordinator<C>,
    ) -> Result<StepOutcome> {
        coordinator.all_reduce_gradients(model)?;

        let scaler = match self {
            GradientManager::Full => {
                optimizer.step(model.parameters_mut())?;
                return Ok(StepOutcome::Applied);
            }
            GradientManager::Reduced(scaler) => scaler,
        };

        let inv_scale = 1.0 / scaler.scale();
        let mut overflow = false;
        for param in model.parameters_mut().iter_mut().filter(|p| p.requires_grad()) {
            let grad = param.grad_mut();
            grad.mapv_inplace(|g| g * inv_scale);
            overflow |= grad.iter().any(|g| !g.is_finite());
        }

        scaler.update(overflow);

        if overflow {
            debug!(scale = scaler.scale(); "gradient overflow, skipping step");
            model.zero_grad();
            return Ok(StepOutcome::Skipped);
        }

        optimizer.step(model.parameters_mut())?;
        Ok(StepOutcome::Applied)
    }
}

fn round_half(x: f32) -> f32 {
    f16::from_f32(x).to_f32()
}

#[cfg(test)]
mod tests {
    use comms::Solo;
    use machine_learning::{arch::Parameter, optimization::Adam};
    use ndarray::{ArrayD, ArrayView3, IxDyn};

    use super::*;

    /// One scalar parameter whose gradient is whatever `backward` receives, summed.
    struct Scalar {
        params: Vec<Parameter>,
    }

    impl Scalar {
        fn new() -> Self {
            Self {
                params: vec![Parameter::new("w", ArrayD::zeros(IxDyn(&[1])))],
            }
        }
    }

    impl TrainableModel for Scalar {
        fn forward(
            &mut self,
            x: ArrayView3<f32>,
            _: ArrayView3<f32>,
            _: ArrayView3<f32>,
            _: ArrayView3<f32>,
        ) -> machine_learning::Result<machine_learning::arch::Forward> {
            Ok(machine_learning::arch::Forward::Output(x.to_owned()))
        }

        fn backward(&mut self, d_out: ArrayView3<f32>) -> machine_learning::Result<()> {
            self.params[0].grad_mut()[[0]] += d_out.sum();
            Ok(())
        }

        fn parameters(&self) -> &[Parameter] {
            &self.params
        }

        fn parameters_mut(&mut self) -> &mut [Parameter] {
            &mut self.params
        }

        fn set_training(&mut self, _: bool) {}

        fn is_training(&self) -> bool {
            true
        }
    }

    fn grad(value: f32) -> Array3<f32> {
        Array3::from_elem((1, 1, 1), value)
    }

    #[test]
    fn full_precision_always_applies() {
        let coordinator = Coordinator::new(Solo::new());
        let mut model = Scalar::new();
        let mut optimizer = Adam::with_defaults(model.parameters(), 0.1);
        let mut manager = GradientManager::new(false);

        manager.backward(&mut model, grad(1.0)).unwrap();
        let outcome = manager.step(&mut model, &mut optimizer, &coordinator).unwrap();

        assert_eq!(outcome, StepOutcome::Applied);
        assert!(model.params[0].value()[[0]] < 0.0);
    }

    #[test]
    fn overflow_skips_and_backs_off() {
        let coordinator = Coordinator::new(Solo::new());
        let mut model = Scalar::new();
        let mut optimizer = Adam::with_defaults(model.parameters(), 0.1);
        let mut manager = GradientManager::new(true);

        manager.backward(&mut model, grad(10.0)).unwrap();
        let outcome = manager.step(&mut model, &mut optimizer, &coordinator).unwrap();

        assert_eq!(outcome, StepOutcome::Skipped);
        assert_eq!(model.params[0].value()[[0]], 0.0);
        assert_eq!(model.params[0].grad()[[0]], 0.0);
        assert_eq!(manager.scale(), Some(INIT_SCALE * BACKOFF_FACTOR));
    }

    #[test]
    fn scaled_gradients_are_unscaled_before_stepping() {
        let coordinator = Coordinator::new(Solo::new());
        let mut model = Scalar::new();
        let mut optimizer = Adam::with_defaults(model.parameters(), 0.1);
        let mut manager = GradientManager::new(true);

        manager.backward(&mut model, grad(1e-3)).unwrap();
        assert!(model.params[0].grad()[[0]] > 1.0);

        let outcome = manager.step(&mut model, &mut optimizer, &coordinator).unwrap();

        assert_eq!(outcome, StepOutcome::Applied);
        assert!((model.params[0].grad()[[0]] - 1e-3).abs() < 1e-5);
        assert_eq!(manager.scale(), Some(INIT_SCALE));
    }

    #[test]
    fn scale_grows_after_a_clean_interval() {
        let mut scaler = GradScaler::new();

        (0..GROWTH_INTERVAL).for_each(|_| scaler.update(false));

        assert_eq!(scaler.scale(), INIT_SCALE * GROWTH_FACTOR);
    }

    #[test]
    fn autocast_rounds_to_half() {
        let manager = GradientManager::new(true);

        let out = manager.autocast(Array3::from_elem((1, 1, 1), 1.0 + 1e-4));

        assert_eq!(out[[0, 0, 0]], 1.0);
    }
}
