use std::collections::BTreeMap;

use crate::{Result, tracking::Tracker};

/// One epoch's scalar results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSnapshot {
    pub train_loss: f32,
    pub vali_loss: f32,
    pub vali_metric: f32,
    pub test_loss: f32,
    pub test_metric: f32,
}

/// Forwards epoch metrics to the tracking sink from the designated replica.
#[derive(Debug, Clone)]
pub struct MetricExporter {
    loss_name: String,
    metric_name: String,
    enabled: bool,
}

impl MetricExporter {
    /// Creates a new `MetricExporter`.
    ///
    /// # Args
    /// * `loss_name` - Prefix of the loss keys, e.g. `MSE`.
    /// * `metric_name` - Prefix of the metric keys, e.g. `MAE`.
    /// * `enabled` - Whether this replica exports; the others drop every call.
    pub fn new(loss_name: &str, metric_name: &str, enabled: bool) -> Self {
        Self {
            loss_name: loss_name.to_lowercase(),
            metric_name: metric_name.to_lowercase(),
            enabled,
        }
    }

    /// Names the snapshot's values, e.g. `train_mse_loss` or `vali_mae_metric`.
    pub fn keyed(&self, snapshot: &MetricSnapshot) -> BTreeMap<String, f32> {
        let (loss, metric) = (&self.loss_name, &self.metric_name);

        BTreeMap::from([
            (format!("train_{loss}_loss"), snapshot.train_loss),
            (format!("vali_{loss}_loss"), snapshot.vali_loss),
            (format!("vali_{metric}_metric"), snapshot.vali_metric),
            (format!("test_{loss}_loss"), snapshot.test_loss),
            (format!("test_{metric}_metric"), snapshot.test_metric),
        ])
    }

    /// Logs `metrics` at step `epoch`, unchanged.
    pub fn export(
        &self,
        tracker: &mut dyn Tracker,
        epoch: usize,
        metrics: &BTreeMap<String, f32>,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        tracker.log_metrics(metrics, epoch)
    }
}
