mod builder;
mod dlinear;
mod linear;
pub mod loss;
mod model;
mod parameter;
mod projection;

pub use builder::{ModelBuilder, ModelKind, ModelSpec};
pub use dlinear::DLinear;
pub use linear::Linear;
pub use model::{Forward, StateDict, TrainableModel};
pub use parameter::Parameter;
