mod builder;
mod cosine;
mod one_cycle;
mod policy;
mod step_decay;
mod tst;

pub use builder::PolicyBuilder;
pub use cosine::CosineAnnealing;
pub use one_cycle::OneCycle;
pub use policy::{LearningRatePolicy, LrPolicyState};
pub use step_decay::{DecayTable, StepDecay};
pub use tst::Tst;
