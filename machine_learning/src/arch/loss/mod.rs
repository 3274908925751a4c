mod loss_fn;
mod mae;
mod metrics;
mod mse;

pub use loss_fn::{LossFn, Metric};
pub use mae::Mae;
pub use metrics::{Mape, Rmse, get_loss_function, get_metric_function};
pub use mse::Mse;
