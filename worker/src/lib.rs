pub mod builder;
pub mod checkpoint;
pub mod config;
pub mod coordinator;
pub mod early_stopping;
pub mod error;
pub mod evaluate;
pub mod export;
pub mod metrics;
pub mod precision;
pub mod schedule;
pub mod state;
pub mod tracking;
pub mod training;
pub mod window;
pub mod worker;

pub use builder::WorkerBuilder;
pub use config::{LrPolicyKind, RunConfig};
pub use error::{Result, WorkerErr};
pub use training::{RunSummary, Streams};
pub use worker::Worker;
