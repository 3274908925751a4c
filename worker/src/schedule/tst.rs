use machine_learning::optimization::Optimizer;

use super::{DecayTable, LearningRatePolicy, LrPolicyState};

/// The halving table applied before every optimizer step.
///
/// The epoch is derived from the step count, and the optimizer's rate is
/// overwritten on every advance.
#[derive(Debug, Clone)]
pub struct Tst {
    base_rate: f32,
    steps_per_epoch: usize,
    step_count: usize,
    last_rate: f32,
}

impl Tst {
    pub fn new(base_rate: f32, steps_per_epoch: usize) -> Self {
        Self {
            base_rate,
            steps_per_epoch: steps_per_epoch.max(1),
            step_count: 0,
            last_rate: base_rate,
        }
    }
}

impl LearningRatePolicy for Tst {
    fn name(&self) -> &'static str {
        "TST"
    }

    fn is_per_step(&self) -> bool {
        true
    }

    fn value_at(&self, t: usize) -> f32 {
        let epoch = t / self.steps_per_epoch + 1;
        DecayTable::Halving.rate(self.base_rate, epoch)
    }

    fn advance(&mut self, optimizer: &mut dyn Optimizer) -> f32 {
        self.step_count += 1;
        self.last_rate = self.value_at(self.step_count);
        optimizer.set_learning_rate(self.last_rate);
        self.last_rate
    }

    fn state(&self) -> LrPolicyState {
        LrPolicyState {
            last_rate: self.last_rate,
            base_rate: self.base_rate,
            step_count: self.step_count,
        }
    }
}
