use std::{
    fs::File,
    io::{BufWriter, Write},
};

use comms::Collective;
use log::{info, warn};
use machine_learning::{arch::TrainableModel, data::StandardScaler};

use crate::{
    Result,
    checkpoint::{CheckpointStore, TrainableSet},
    coordinator::Coordinator,
    tracking::Tracker,
};

pub const STATE_DICT_ARTIFACT: &str = "model_state_dict";
/// The fitted scaler's artifact name. The scaler is serialized as JSON, so the
/// artifact is `scaler.json` rather than the pickled `scaler.pkl`.
pub const SCALER_ARTIFACT: &str = "scaler.json";

/// Ships the final artifacts of a run. Call after the end-of-training barrier.
///
/// Only the designated replica does anything: it logs the trainable weights,
/// then the fitted scaler if there is one, then deletes the early-stopping
/// checkpoint directory.
///
/// # Args
/// * `coordinator` - Gates the export to the designated replica.
/// * `model` - The trained model.
/// * `trainable` - The parameters captured as trainable when the run started.
/// * `scaler` - The training stream's fitted transform.
/// * `store` - The run's checkpoint store, emptied at the end.
/// * `tracker` - The sink receiving the artifacts.
///
/// # Errors
/// Failing to log the weights or to delete the checkpoints is fatal, a
/// failing scaler upload is only logged.
pub fn export_artifacts<C: Collective>(
    coordinator: &Coordinator<C>,
    model: &dyn TrainableModel,
    trainable: &TrainableSet,
    scaler: Option<&StandardScaler>,
    store: &CheckpointStore,
    tracker: &mut dyn Tracker,
) -> Result<()> {
    if !coordinator.is_designated_io_process() {
        return Ok(());
    }

    let drifted = trainable.drifted(model);
    if !drifted.is_empty() {
        warn!(
            "trainable flags changed since the run started, exporting the initial set: {}",
            drifted.join(", ")
        );
    }

    let state = trainable.filter(model);
    tracker.log_state_dict(&state, STATE_DICT_ARTIFACT)?;
    info!(tensors = state.len(); "exported model state dict");

    if let Err(e) = scaler.map_or(Ok(()), |scaler| log_scaler(scaler, tracker)) {
        warn!("failed to export the scaler, continuing: {e}");
    }

    store.remove()
}

fn log_scaler(scaler: &StandardScaler, tracker: &mut dyn Tracker) -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join(SCALER_ARTIFACT);

    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer(&mut writer, scaler)?;
    writer.flush()?;

    tracker.log_artifact(&path, SCALER_ARTIFACT)
}
