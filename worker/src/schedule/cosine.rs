use std::f32::consts::PI;

use machine_learning::optimization::Optimizer;

use super::{LearningRatePolicy, LrPolicyState};

const T_MAX: usize = 20;
const ETA_MIN: f32 = 1e-8;

/// Cosine decay from the base rate to `1e-8` over a 20 epoch cycle,
/// regardless of how many epochs the run has.
#[derive(Debug, Clone)]
pub struct CosineAnnealing {
    base_rate: f32,
    epoch: usize,
    last_rate: f32,
}

impl CosineAnnealing {
    pub fn new(base_rate: f32) -> Self {
        Self {
            base_rate,
            epoch: 0,
            last_rate: base_rate,
        }
    }
}

impl LearningRatePolicy for CosineAnnealing {
    fn name(&self) -> &'static str {
        "COS"
    }

    fn is_per_step(&self) -> bool {
        false
    }

    fn value_at(&self, t: usize) -> f32 {
        let phase = PI * t as f32 / T_MAX as f32;
        ETA_MIN + (self.base_rate - ETA_MIN) * (1.0 + phase.cos()) / 2.0
    }

    fn advance(&mut self, optimizer: &mut dyn Optimizer) -> f32 {
        self.epoch += 1;
        self.last_rate = self.value_at(self.epoch);
        optimizer.set_learning_rate(self.last_rate);
        self.last_rate
    }

    fn state(&self) -> LrPolicyState {
        LrPolicyState {
            last_rate: self.last_rate,
            base_rate: self.base_rate,
            step_count: self.epoch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaches_the_floor_after_twenty_epochs() {
        let policy = CosineAnnealing::new(1e-3);

        assert!((policy.value_at(0) - 1e-3).abs() < 1e-9);
        assert!((policy.value_at(10) - (1e-3 + ETA_MIN) / 2.0).abs() < 1e-9);
        assert!((policy.value_at(20) - ETA_MIN).abs() < 1e-9);
    }
}
