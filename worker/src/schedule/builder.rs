use crate::config::{LrPolicyKind, RunConfig};

use super::{CosineAnnealing, DecayTable, LearningRatePolicy, OneCycle, StepDecay, Tst};

pub struct PolicyBuilder;

impl PolicyBuilder {
    /// Builds the learning-rate policy a run selected.
    ///
    /// # Args
    /// * `config` - The run's configuration.
    /// * `steps_per_epoch` - The agreed amount of train batches per epoch.
    ///
    /// # Returns
    /// A boxed policy.
    pub fn build(config: &RunConfig, steps_per_epoch: usize) -> Box<dyn LearningRatePolicy> {
        let lr = config.learning_rate;
        let one_cycle = OneCycle::new(
            lr,
            config.train_epochs * steps_per_epoch,
            config.pct_start,
        );
        // Step-decay runs start where the one-cycle warm-up does, the first
        // advance captures that rate as the table's base.
        let warmup = one_cycle.initial_lr();

        match config.lradj {
            LrPolicyKind::OneCycle => Box::new(one_cycle),
            LrPolicyKind::Cosine => Box::new(CosineAnnealing::new(lr)),
            LrPolicyKind::Type1 => Box::new(StepDecay::new(DecayTable::Halving, warmup)),
            LrPolicyKind::Type2 => Box::new(StepDecay::new(DecayTable::Overrides, warmup)),
            LrPolicyKind::Type3 => Box::new(StepDecay::new(DecayTable::Plateau, warmup)),
            LrPolicyKind::Pems => Box::new(StepDecay::new(DecayTable::Pems, warmup)),
            LrPolicyKind::Constant => Box::new(StepDecay::new(DecayTable::Constant, warmup)),
            LrPolicyKind::Tst => Box::new(Tst::new(lr, steps_per_epoch)),
        }
    }
}
