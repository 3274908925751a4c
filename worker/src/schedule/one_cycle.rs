use std::f32::consts::PI;

use machine_learning::optimization::Optimizer;

use super::{LearningRatePolicy, LrPolicyState};

const DIV_FACTOR: f32 = 25.0;
const FINAL_DIV_FACTOR: f32 = 1e4;

/// Warms up from `max_lr / 25` to `max_lr` over the first `pct_start` of the
/// run, then anneals to `max_lr / 25e4` by the last step, both along a cosine.
#[derive(Debug, Clone)]
pub struct OneCycle {
    max_lr: f32,
    total_steps: usize,
    pct_start: f32,
    step_count: usize,
    last_rate: f32,
}

impl OneCycle {
    /// Creates a new `OneCycle` schedule.
    ///
    /// # Args
    /// * `max_lr` - The peak rate.
    /// * `total_steps` - `train_epochs * steps_per_epoch`.
    /// * `pct_start` - The share of steps spent warming up.
    pub fn new(max_lr: f32, total_steps: usize, pct_start: f32) -> Self {
        let mut policy = Self {
            max_lr,
            total_steps: total_steps.max(1),
            pct_start,
            step_count: 0,
            last_rate: 0.0,
        };
        policy.last_rate = policy.value_at(0);
        policy
    }

    pub fn initial_lr(&self) -> f32 {
        self.max_lr / DIV_FACTOR
    }

    pub fn min_lr(&self) -> f32 {
        self.initial_lr() / FINAL_DIV_FACTOR
    }

    /// The step the rate peaks at.
    pub fn peak_step(&self) -> f32 {
        self.pct_start * self.total_steps as f32 - 1.0
    }
}

fn anneal_cos(start: f32, end: f32, pct: f32) -> f32 {
    end + (start - end) / 2.0 * ((PI * pct).cos() + 1.0)
}

impl LearningRatePolicy for OneCycle {
    fn name(&self) -> &'static str {
        "one_cycle"
    }

    fn is_per_step(&self) -> bool {
        true
    }

    fn value_at(&self, t: usize) -> f32 {
        let step = t.min(self.total_steps - 1) as f32;
        let peak = self.peak_step();
        let last = (self.total_steps - 1) as f32;

        let (start_step, end_step, start, end) = if step <= peak {
            (0.0, peak, self.initial_lr(), self.max_lr)
        } else {
            (peak, last, self.max_lr, self.min_lr())
        };

        let span = end_step - start_step;
        let pct = if span > 0.0 {
            (step - start_step) / span
        } else {
            1.0
        };

        anneal_cos(start, end, pct)
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
            base_rate: self.max_lr,
            step_count: self.step_count,
        }
    }
}
