use comms::Collective;
use log::debug;
use machine_learning::{
    arch::{
        TrainableModel,
        loss::{LossFn, Metric},
    },
    data::BatchStream,
    optimization::Optimizer,
};
use serde::Serialize;

use crate::{
    Result,
    checkpoint::{CheckpointStore, TrainableSet},
    config::RunConfig,
    coordinator::Coordinator,
    early_stopping::{EarlyStopState, EarlyStopping, MonitorState},
    evaluate::{EvalContext, evaluate},
    metrics::{MetricExporter, MetricSnapshot},
    precision::{GradientManager, StepOutcome},
    schedule::LearningRatePolicy,
    state::{EpochState, left_time},
    tracking::Tracker,
    window::ForecastWindow,
};

const PROGRESS_EVERY: usize = 100;

/// The train, validation and test streams of one replica.
pub struct Streams {
    pub train: Box<dyn BatchStream>,
    pub vali: Box<dyn BatchStream>,
    pub test: Box<dyn BatchStream>,
}

/// The external pieces the loop drives.
pub struct Collaborators<'a> {
    pub model: &'a mut dyn TrainableModel,
    pub optimizer: &'a mut dyn Optimizer,
    pub loss_fn: &'a dyn LossFn,
    pub metric_fn: &'a dyn Metric,
    pub trainable: &'a TrainableSet,
    pub tracker: &'a mut dyn Tracker,
}

/// How a run went.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    pub early_stop: EarlyStopState,
    pub epochs_run: usize,
    pub steps_applied: usize,
    pub steps_skipped: usize,
    pub last_rate: f32,
}

/// Drives epochs and batches for one replica.
///
/// Every replica runs the same sequence of collectives: the parameter
/// broadcast, one gradient all-reduce per step and one all-reduce per
/// evaluation. Every branch depends only on all-reduced values.
pub struct TrainingLoop<'a, C> {
    config: &'a RunConfig,
    coordinator: &'a Coordinator<C>,
    window: ForecastWindow,
    policy: Box<dyn LearningRatePolicy>,
    precision: GradientManager,
    early_stopping: EarlyStopping,
    exporter: MetricExporter,
    steps_per_epoch: usize,
}

impl<'a, C: Collective> TrainingLoop<'a, C> {
    /// Creates a new `TrainingLoop`.
    ///
    /// # Args
    /// * `config` - The run's configuration.
    /// * `coordinator` - This replica's collectives.
    /// * `policy` - The learning-rate schedule.
    /// * `steps_per_epoch` - The agreed amount of train batches per epoch.
    pub fn new(
        config: &'a RunConfig,
        coordinator: &'a Coordinator<C>,
        policy: Box<dyn LearningRatePolicy>,
        steps_per_epoch: usize,
    ) -> Self {
        Self {
            config,
            coordinator,
            window: ForecastWindow::new(config.label_len, config.pred_len, config.features),
            policy,
            precision: GradientManager::new(config.use_amp),
            early_stopping: EarlyStopping::new(config.patience, config.delta),
            exporter: MetricExporter::new(
                &config.loss,
                &config.metric,
                coordinator.is_designated_io_process(),
            ),
            steps_per_epoch,
        }
    }

    pub fn policy(&self) -> &dyn LearningRatePolicy {
        self.policy.as_ref()
    }

    /// Trains until `train_epochs` epochs ran or early stopping triggers.
    ///
    /// # Args
    /// * `parts` - The model, optimizer, loss, metric and tracking sink.
    /// * `streams` - The replica's data.
    /// * `store` - Where early-stopping checkpoints go.
    ///
    /// # Returns
    /// The run's summary, its early-stopping state included.
    pub fn run(
        &mut self,
        parts: Collaborators<'_>,
        streams: &mut Streams,
        store: &mut CheckpointStore,
    ) -> Result<RunSummary> {
        let Collaborators {
            model,
            optimizer,
            loss_fn,
            metric_fn,
            trainable,
            tracker,
        } = parts;

        let train_epochs = self.config.train_epochs;
        let mut summary = RunSummary {
            early_stop: self.early_stopping.state(),
            epochs_run: 0,
            steps_applied: 0,
            steps_skipped: 0,
            last_rate: self.policy.initial_rate(),
        };

        optimizer.set_learning_rate(summary.last_rate);
        self.coordinator.broadcast_parameters(model)?;
        model.set_training(true);

        for epoch in 0..train_epochs {
            let mut state = EpochState::start(epoch);
            streams.train.set_epoch(epoch);

            for (i, batch) in streams.train.batches().enumerate() {
                model.zero_grad();

                let dec_inp = self.window.decoder_input(batch.y.view())?;
                let out = model
                    .forward(
                        batch.x.view(),
                        batch.x_mark.view(),
                        dec_inp.view(),
                        batch.y_mark.view(),
                    )?
                    .into_output();
                let out = self.precision.autocast(out);

                let (pred, target) = self.window.scored_pair(out.view(), batch.y.view())?;
                let loss = loss_fn.loss(pred, target);
                state.record_loss(loss);

                let d_out = self
                    .window
                    .expand_grad(loss_fn.loss_prime(pred, target).view(), out.raw_dim());
                self.precision.backward(model, d_out)?;

                match self.precision.step(model, optimizer, self.coordinator)? {
                    StepOutcome::Applied => summary.steps_applied += 1,
                    StepOutcome::Skipped => {
                        summary.steps_skipped += 1;
                        debug!(epoch = epoch, step = i; "optimizer step skipped");
                    }
                }

                if self.policy.is_per_step() {
                    summary.last_rate = self.policy.advance(optimizer);
                }

                if (i + 1) % PROGRESS_EVERY == 0 {
                    let speed = state.speed();
                    let left = left_time(speed, train_epochs - epoch, self.steps_per_epoch, i);
                    self.coordinator.print(format_args!(
                        "\titers: {}, epoch: {} | loss: {loss:.7}",
                        i + 1,
                        epoch + 1
                    ));
                    self.coordinator.print(format_args!(
                        "\tspeed: {speed:.4}s/iter; left time: {left:.4}s"
                    ));
                    state.reset_lap();
                }
            }

            self.coordinator.print(format_args!(
                "Epoch: {} cost time: {:.3}s",
                epoch + 1,
                state.elapsed().as_secs_f64()
            ));

            let ctx = EvalContext {
                loss_fn,
                metric_fn,
                window: self.window,
                precision: &self.precision,
                coordinator: self.coordinator,
            };
            let vali = evaluate(model, streams.vali.as_ref(), "vali", &ctx)?;
            let test = evaluate(model, streams.test.as_ref(), "test", &ctx)?;

            let snapshot = MetricSnapshot {
                train_loss: state.average_loss(),
                vali_loss: vali.loss,
                vali_metric: vali.metric,
                test_loss: test.loss,
                test_metric: test.metric,
            };
            self.coordinator.print(format_args!(
                "Epoch: {} | Train Loss: {:.7} Vali Loss: {:.7} Test Loss: {:.7} {} Metric: {:.7}",
                epoch + 1,
                snapshot.train_loss,
                snapshot.vali_loss,
                snapshot.test_loss,
                self.config.metric,
                snapshot.test_metric
            ));
            self.exporter
                .export(tracker, epoch, &self.exporter.keyed(&snapshot))?;

            summary.epochs_run += 1;
            let monitor = self
                .early_stopping
                .observe(vali.loss, model, trainable, store)?;
            summary.early_stop = self.early_stopping.state();

            if monitor == MonitorState::Stopped {
                self.coordinator.print("Early stopping");
                break;
            }

            if !self.policy.is_per_step() {
                summary.last_rate = self.policy.advance(optimizer);
                self.coordinator
                    .print(format_args!("Updating learning rate to {}", summary.last_rate));
            }
        }

        Ok(summary)
    }
}
