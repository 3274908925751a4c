use comms::Collective;

use crate::{Result, Worker, config::RunConfig};

pub struct WorkerBuilder;

impl WorkerBuilder {
    /// Builds a `Worker` from a `RunConfig`.
    ///
    /// # Args
    /// * `config` - The run's configuration.
    /// * `collective` - The replica's member of the group.
    ///
    /// # Returns
    /// A worker ready to run.
    ///
    /// # Errors
    /// `WorkerErr::Config` if the configuration is invalid, before anything runs.
    pub fn build<C: Collective>(config: RunConfig, collective: C) -> Result<Worker<C>> {
        config.validate()?;
        Ok(Worker::new(config, collective))
    }
}
