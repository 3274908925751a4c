use comms::Collective;
use log::info;
use machine_learning::{
    arch::{ModelBuilder, ModelSpec, TrainableModel, loss},
    optimization::Adam,
};

use crate::{
    Result, WorkerErr,
    checkpoint::{CheckpointStore, TrainableSet},
    config::RunConfig,
    coordinator::Coordinator,
    export::export_artifacts,
    schedule::PolicyBuilder,
    tracking::Tracker,
    training::{Collaborators, RunSummary, Streams, TrainingLoop},
};

/// One data-parallel replica of a run.
pub struct Worker<C> {
    config: RunConfig,
    coordinator: Coordinator<C>,
}

impl<C: Collective> Worker<C> {
    /// Creates a new `Worker`. Use `WorkerBuilder` to validate the config first.
    ///
    /// # Args
    /// * `config` - The run's configuration, identical on every replica.
    /// * `collective` - This replica's member of the group.
    pub fn new(config: RunConfig, collective: C) -> Self {
        Self {
            config,
            coordinator: Coordinator::new(collective),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Coordinator<C> {
        &self.coordinator
    }

    /// Builds the model the configuration selects.
    pub fn build_model(&self) -> Result<Box<dyn TrainableModel>> {
        let spec = ModelSpec {
            seq_len: self.config.seq_len,
            pred_len: self.config.pred_len,
            enc_in: self.config.enc_in,
            moving_avg: self.config.moving_avg,
            output_attention: self.config.output_attention,
            seed: self.config.seed,
        };

        Ok(ModelBuilder::build(self.config.model, &spec)?)
    }

    /// Runs repetition `itr` with the configured model.
    ///
    /// # Args
    /// * `itr` - The repetition index, part of the run's setting.
    /// * `streams` - This replica's data.
    /// * `tracker` - The tracking sink; only the designated replica writes to it.
    pub fn run(
        &self,
        itr: usize,
        streams: Streams,
        tracker: &mut dyn Tracker,
    ) -> Result<RunSummary> {
        let model = self.build_model()?;
        self.run_with(itr, model, streams, tracker)
    }

    /// Runs repetition `itr` with `model`: trains, waits for every replica,
    /// then exports the artifacts from the designated replica.
    ///
    /// # Errors
    /// Any replica-local failure. A failing replica must tear its group down
    /// so that peers blocked in a collective return too.
    pub fn run_with(
        &self,
        itr: usize,
        mut model: Box<dyn TrainableModel>,
        mut streams: Streams,
        tracker: &mut dyn Tracker,
    ) -> Result<RunSummary> {
        let setting = self.config.setting(itr);
        let rank = self.coordinator.rank();
        info!(rank = rank, setting = setting.as_str(); "starting replica");

        let loss_fn = loss::get_loss_function(&self.config.loss)
            .map_err(|e| WorkerErr::Config(e.to_string()))?;
        let metric_fn = loss::get_metric_function(&self.config.metric)
            .map_err(|e| WorkerErr::Config(e.to_string()))?;

        let steps_per_epoch = self.coordinator.agree_on_steps(streams.train.len())?;
        if steps_per_epoch == 0 {
            return Err(WorkerErr::EmptyStream("train"));
        }

        let trainable = TrainableSet::capture(model.as_ref());
        let mut optimizer = Adam::with_defaults(model.parameters(), self.config.learning_rate);
        let scaler = streams.train.scaler().cloned();
        let mut store = CheckpointStore::new(
            &self.config.checkpoints,
            &setting,
            self.coordinator.is_designated_io_process(),
            scaler.clone(),
        );

        let policy = PolicyBuilder::build(&self.config, steps_per_epoch);
        let mut training = TrainingLoop::new(&self.config, &self.coordinator, policy, steps_per_epoch);

        let summary = training.run(
            Collaborators {
                model: model.as_mut(),
                optimizer: &mut optimizer,
                loss_fn: loss_fn.as_ref(),
                metric_fn: metric_fn.as_ref(),
                trainable: &trainable,
                tracker: &mut *tracker,
            },
            &mut streams,
            &mut store,
        )?;

        self.coordinator.barrier()?;

        export_artifacts(
            &self.coordinator,
            model.as_ref(),
            &trainable,
            scaler.as_ref(),
            &store,
            tracker,
        )?;

        info!(
            rank = rank,
            epochs = summary.epochs_run,
            skipped = summary.steps_skipped;
            "replica finished"
        );
        Ok(summary)
    }
}
