use machine_learning::optimization::Optimizer;

/// The cursor of a learning-rate schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LrPolicyState {
    pub last_rate: f32,
    pub base_rate: f32,
    pub step_count: usize,
}

/// A learning-rate schedule.
///
/// Rates depend only on the policy's parameters and how many times it was
/// advanced, so every replica computes the same sequence.
pub trait LearningRatePolicy: Send {
    fn name(&self) -> &'static str;

    /// Whether `advance` is called after every optimizer step (`true`) or once
    /// per epoch (`false`).
    fn is_per_step(&self) -> bool;

    /// The rate at step (per-step policies) or epoch (per-epoch policies) `t`.
    fn value_at(&self, t: usize) -> f32;

    /// The rate the optimizer starts the run with.
    fn initial_rate(&self) -> f32 {
        self.value_at(0)
    }

    /// Moves the schedule forward once and writes the new rate into `optimizer`.
    ///
    /// # Returns
    /// The rate now set on the optimizer.
    fn advance(&mut self, optimizer: &mut dyn Optimizer) -> f32;

    fn state(&self) -> LrPolicyState;
}
