use machine_learning::optimization::Optimizer;

use super::{LearningRatePolicy, LrPolicyState};

const TYPE2_OVERRIDES: [(usize, f32); 7] = [
    (2, 5e-5),
    (4, 1e-5),
    (6, 5e-6),
    (8, 1e-6),
    (10, 5e-7),
    (15, 1e-7),
    (20, 5e-8),
];

/// The epoch to rate rules of the step-decay family.
///
/// Epochs are 1-based: the rate for epoch `e` applies after `e` epochs ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayTable {
    /// `base * 0.5^(e - 1)`.
    Halving,
    /// Fixed overrides at epochs 2, 4, 6, 8, 10, 15 and 20.
    Overrides,
    /// `base` until epoch 3, then `base * 0.9^(e - 3)`.
    Plateau,
    /// `base * 0.95^e`.
    Pems,
    Constant,
}

impl DecayTable {
    /// The rate for 1-based `epoch` given the captured `base`.
    pub fn rate(&self, base: f32, epoch: usize) -> f32 {
        match self {
            DecayTable::Halving => base * 0.5f32.powi(epoch.saturating_sub(1) as i32),
            DecayTable::Overrides => TYPE2_OVERRIDES
                .iter()
                .rev()
                .find(|(at, _)| *at <= epoch)
                .map_or(base, |&(_, rate)| rate),
            DecayTable::Plateau if epoch < 3 => base,
            DecayTable::Plateau => base * 0.9f32.powi((epoch - 3) as i32),
            DecayTable::Pems => base * 0.95f32.powi(epoch as i32),
            DecayTable::Constant => base,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DecayTable::Halving => "type1",
            DecayTable::Overrides => "type2",
            DecayTable::Plateau => "type3",
            DecayTable::Pems => "PEMS",
            DecayTable::Constant => "constant",
        }
    }
}

/// A per-epoch decay table whose base rate is read from the optimizer the
/// first time it advances, not taken from the configuration.
///
/// The run starts at `start_rate`, which the builder sets to the one-cycle
/// warm-up rate.
#[derive(Debug, Clone)]
pub struct StepDecay {
    table: DecayTable,
    start_rate: f32,
    base_rate: Option<f32>,
    epoch: usize,
    last_rate: f32,
}

impl StepDecay {
    pub fn new(table: DecayTable, start_rate: f32) -> Self {
        Self {
            table,
            start_rate,
            base_rate: None,
            epoch: 0,
            last_rate: start_rate,
        }
    }

    fn base(&self) -> f32 {
        self.base_rate.unwrap_or(self.start_rate)
    }
}

impl LearningRatePolicy for StepDecay {
    fn name(&self) -> &'static str {
        self.table.name()
    }

    fn is_per_step(&self) -> bool {
        false
    }

    fn value_at(&self, t: usize) -> f32 {
        if t == 0 {
            return self.base();
        }
        self.table.rate(self.base(), t)
    }

    fn initial_rate(&self) -> f32 {
        self.start_rate
    }

    fn advance(&mut self, optimizer: &mut dyn Optimizer) -> f32 {
        if self.base_rate.is_none() {
            self.base_rate = Some(optimizer.learning_rate());
        }

        self.epoch += 1;
        self.last_rate = self.value_at(self.epoch);
        optimizer.set_learning_rate(self.last_rate);
        self.last_rate
    }

    fn state(&self) -> LrPolicyState {
        LrPolicyState {
            last_rate: self.last_rate,
            base_rate: self.base(),
            step_count: self.epoch,
        }
    }
}
