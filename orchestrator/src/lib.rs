pub mod configs;
pub mod env;
pub mod error;
pub mod provider;
mod session;
pub mod tracking;

use std::path::Path;

use log::info;
use worker::{RunConfig, RunSummary};

pub use error::{OrchestratorError, Result};
pub use provider::DataProvider;
pub use session::Session;
pub use tracking::FileTracker;

/// Trains `config` with `world_size` replicas and waits for them to finish.
///
/// # Arguments
/// * `config` - The run's configuration.
/// * `world_size` - The amount of data-parallel replicas.
/// * `tracking_root` - The directory the run is recorded under.
///
/// # Returns
/// Every replica's summaries, indexed by rank then repetition.
///
/// # Errors
/// Returns an `OrchestratorError` if the config or data are invalid, or if
/// any replica fails.
pub fn train(
    config: RunConfig,
    world_size: usize,
    tracking_root: impl AsRef<Path>,
) -> Result<Vec<Vec<RunSummary>>> {
    configs::validate_for(&config, world_size)?;

    let provider = DataProvider::load(&config)?;
    info!(world_size = world_size, itr = config.itr; "starting session");

    let session = Session::new(
        config,
        provider,
        world_size,
        Some(tracking_root.as_ref().to_path_buf()),
    )?;
    session.wait()
}
