use std::{path::PathBuf, sync::Arc};

use comms::{LocalGroup, LocalMember};
use log::{error, info};
use tokio::{runtime::Runtime, task::JoinSet};
use worker::{
    RunConfig, RunSummary, WorkerBuilder,
    tracking::{RunContext, RunStatus},
};

use crate::{
    error::{OrchestratorError, Result},
    provider::DataProvider,
    tracking::FileTracker,
};

/// A training session: `world_size` replicas of one run, each on its own
/// thread of the runtime's blocking pool, bound together by a `LocalGroup`.
pub struct Session {
    runtime: Runtime,
    config: Arc<RunConfig>,
    provider: Arc<DataProvider>,
    world_size: usize,
    tracking_root: Option<PathBuf>,
}

impl Session {
    /// Creates a new `Session`.
    ///
    /// # Arguments
    /// * `config` - The run's configuration, shared by every replica.
    /// * `provider` - The data every replica draws its shard from.
    /// * `world_size` - The amount of replicas.
    /// * `tracking_root` - Where the designated replica records the run, if anywhere.
    ///
    /// # Returns
    /// A new `Session` instance or an io error if the runtime can't be built.
    pub fn new(
        config: RunConfig,
        provider: DataProvider,
        world_size: usize,
        tracking_root: Option<PathBuf>,
    ) -> Result<Self> {
        Ok(Self {
            runtime: Runtime::new()?,
            config: Arc::new(config),
            provider: Arc::new(provider),
            world_size,
            tracking_root,
        })
    }

    /// Runs every replica to completion.
    ///
    /// The first replica to fail tears the group down so that its peers
    /// return from any collective they are blocked in.
    ///
    /// # Returns
    /// The summaries of every repetition, indexed by rank then repetition.
    ///
    /// # Errors
    /// The first failure reported by any replica.
    pub fn wait(self) -> Result<Vec<Vec<RunSummary>>> {
        let Self {
            runtime,
            config,
            provider,
            world_size,
            tracking_root,
        } = self;

        runtime.block_on(async move {
            let (group, members) = LocalGroup::new(world_size);
            let mut tasks = JoinSet::new();

            for (rank, member) in members.into_iter().enumerate() {
                let replica = Replica {
                    rank,
                    world_size,
                    config: Arc::clone(&config),
                    provider: Arc::clone(&provider),
                    tracking_root: tracking_root.clone().filter(|_| rank == 0),
                };
                tasks.spawn_blocking(move || (rank, replica.run(member)));
            }

            let mut summaries = vec![None; world_size];
            let mut failure = None;

            while let Some(joined) = tasks.join_next().await {
                let outcome = match joined {
                    Ok((rank, Ok(done))) => {
                        summaries[rank] = Some(done);
                        continue;
                    }
                    Ok((_, Err(e))) => e,
                    Err(e) => OrchestratorError::Join(e.to_string()),
                };

                error!("{outcome}");
                group.abort();
                failure.get_or_insert(outcome);
            }

            match failure {
                Some(e) => Err(e),
                None => Ok(summaries.into_iter().flatten().collect()),
            }
        })
    }
}

struct Replica {
    rank: usize,
    world_size: usize,
    config: Arc<RunConfig>,
    provider: Arc<DataProvider>,
    tracking_root: Option<PathBuf>,
}

impl Replica {
    /// Runs every repetition of the run inside one tracking context.
    fn run(self, member: LocalMember) -> Result<Vec<RunSummary>> {
        let rank = self.rank;
        let fail = |source| OrchestratorError::WorkerError { rank, source };

        let worker = WorkerBuilder::build(self.config.as_ref().clone(), member).map_err(fail)?;

        let mut ctx = match &self.tracking_root {
            Some(root) => {
                let tracker = FileTracker::create(root, &self.config.experiment).map_err(fail)?;
                RunContext::open(Box::new(tracker), &self.config.to_params()).map_err(fail)?
            }
            None => RunContext::detached(),
        };

        let mut summaries = Vec::with_capacity(self.config.itr);
        for itr in 0..self.config.itr {
            let streams = self.provider.streams(rank, self.world_size)?;
            let summary = worker.run(itr, streams, ctx.tracker()).map_err(fail)?;

            info!(
                rank = rank,
                itr = itr,
                epochs = summary.epochs_run;
                "repetition finished"
            );
            summaries.push(summary);
        }

        ctx.close(RunStatus::Finished).map_err(fail)?;
        Ok(summaries)
    }
}
