use std::time::{Duration, Instant};

/// Per-epoch bookkeeping of the training loop, reset at every epoch start.
#[derive(Debug)]
pub struct EpochState {
    pub epoch: usize,
    /// Iterations since the last progress report.
    pub iter_count: usize,
    loss_sum: f64,
    batches: usize,
    epoch_start: Instant,
    lap_start: Instant,
}

impl EpochState {
    pub fn start(epoch: usize) -> Self {
        let now = Instant::now();

        Self {
            epoch,
            iter_count: 0,
            loss_sum: 0.0,
            batches: 0,
            epoch_start: now,
            lap_start: now,
        }
    }

    pub fn record_loss(&mut self, loss: f32) {
        self.loss_sum += loss as f64;
        self.batches += 1;
        self.iter_count += 1;
    }

    /// The mean of the recorded losses, `NaN` if none was recorded.
    pub fn average_loss(&self) -> f32 {
        if self.batches == 0 {
            return f32::NAN;
        }
        (self.loss_sum / self.batches as f64) as f32
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Seconds per iteration since the last report.
    pub fn speed(&self) -> f64 {
        self.lap_start.elapsed().as_secs_f64() / self.iter_count.max(1) as f64
    }

    /// Starts a new progress lap.
    pub fn reset_lap(&mut self) {
        self.iter_count = 0;
        self.lap_start = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.epoch_start.elapsed()
    }
}

/// Estimated seconds left in the run.
///
/// # Args
/// * `speed` - Seconds per iteration.
/// * `remaining_epochs` - Epochs left including the current one.
/// * `steps_per_epoch` - Train batches per epoch.
/// * `step` - The current step within the epoch.
pub fn left_time(speed: f64, remaining_epochs: usize, steps_per_epoch: usize, step: usize) -> f64 {
    speed * (remaining_epochs * steps_per_epoch).saturating_sub(step) as f64
}
