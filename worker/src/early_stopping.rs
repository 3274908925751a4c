use log::debug;
use machine_learning::arch::TrainableModel;
use serde::Serialize;

use crate::{
    Result,
    checkpoint::{CheckpointStore, TrainableSet},
};

/// Whether training should go on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    Stopped,
}

/// The early-stopping bookkeeping, identical on every replica.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EarlyStopState {
    pub best: Option<f32>,
    pub counter: usize,
    pub stopped: bool,
}

/// Stops training once the validation loss has not improved by more than
/// `delta` for `patience` consecutive epochs.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    delta: f32,
    state: EarlyStopState,
}

impl EarlyStopping {
    pub fn new(patience: usize, delta: f32) -> Self {
        Self {
            patience,
            delta,
            state: EarlyStopState::default(),
        }
    }

    pub fn state(&self) -> EarlyStopState {
        self.state
    }

    pub fn monitor_state(&self) -> MonitorState {
        if self.state.stopped {
            MonitorState::Stopped
        } else {
            MonitorState::Running
        }
    }

    /// Feeds one epoch's validation loss.
    ///
    /// The first loss and every later strict improvement become the new best
    /// and are checkpointed through `store`, which only writes on the
    /// designated replica.
    ///
    /// # Args
    /// * `val_loss` - The all-reduced validation loss.
    /// * `model` - The model to checkpoint on improvement.
    /// * `trainable` - The parameters a checkpoint keeps.
    /// * `store` - Where checkpoints go.
    ///
    /// # Returns
    /// The monitor's state after this observation.
    pub fn observe(
        &mut self,
        val_loss: f32,
        model: &dyn TrainableModel,
        trainable: &TrainableSet,
        store: &mut CheckpointStore,
    ) -> Result<MonitorState> {
        if self.state.stopped {
            return Ok(MonitorState::Stopped);
        }

        let improved = match self.state.best {
            None => true,
            Some(best) => val_loss < best - self.delta,
        };

        if improved {
            if let Some(best) = self.state.best {
                debug!(best = best, val_loss = val_loss; "validation loss decreased, saving model");
            }
            self.state.best = Some(val_loss);
            self.state.counter = 0;
            store.save(model, trainable)?;
        } else {
            self.state.counter += 1;
            debug!(counter = self.state.counter, patience = self.patience; "early stopping counter");

            if self.state.counter >= self.patience {
                self.state.stopped = true;
            }
        }

        Ok(self.monitor_state())
    }
}
