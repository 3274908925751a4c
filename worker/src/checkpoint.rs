use std::{
    collections::{BTreeSet, HashMap},
    fs,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use machine_learning::{
    arch::{StateDict, TrainableModel},
    data::StandardScaler,
};
use ndarray::{ArrayD, IxDyn};
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::{Result, WorkerErr};

const CHECKPOINT_FILE: &str = "checkpoint.safetensors";
const SCALER_KEY: &str = "scaler";

/// The names of the parameters that were trainable when the run started.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrainableSet {
    names: BTreeSet<String>,
}

impl TrainableSet {
    /// Captures the parameters of `model` that currently require gradients.
    pub fn capture(model: &dyn TrainableModel) -> Self {
        let names = model
            .parameters()
            .iter()
            .filter(|p| p.requires_grad())
            .map(|p| p.name().to_string())
            .collect();

        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns the parameters whose live trainable flag no longer matches the capture.
    pub fn drifted(&self, model: &dyn TrainableModel) -> Vec<String> {
        model
            .parameters()
            .iter()
            .filter(|p| p.requires_grad() != self.contains(p.name()))
            .map(|p| p.name().to_string())
            .collect()
    }

    /// The state dict of `model` restricted to the captured parameters.
    pub fn filter(&self, model: &dyn TrainableModel) -> StateDict {
        model
            .parameters()
            .iter()
            .filter(|p| self.contains(p.name()))
            .map(|p| (p.name().to_string(), p.value().clone()))
            .collect()
    }
}

/// Trainable weights plus the fitted transform they were trained against.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointRecord {
    pub tensors: StateDict,
    pub scaler: Option<StandardScaler>,
}

impl CheckpointRecord {
    pub fn capture(
        model: &dyn TrainableModel,
        trainable: &TrainableSet,
        scaler: Option<&StandardScaler>,
    ) -> Self {
        Self {
            tensors: trainable.filter(model),
            scaler: scaler.cloned(),
        }
    }

    /// Writes the record as a safetensors file, the scaler going into its metadata.
    pub fn save(&self, path: &Path) -> Result<()> {
        let metadata = match &self.scaler {
            Some(scaler) => Some(HashMap::from([(
                SCALER_KEY.to_string(),
                serde_json::to_string(scaler)?,
            )])),
            None => None,
        };

        write_state_dict(path, &self.tensors, metadata)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let tensors = decode_state_dict(&bytes)?;

        let (_, metadata) = SafeTensors::read_metadata(&bytes)?;
        let scaler = match metadata.metadata().as_ref().and_then(|m| m.get(SCALER_KEY)) {
            Some(json) => Some(
                serde_json::from_str(json).map_err(|e| WorkerErr::Checkpoint(e.to_string()))?,
            ),
            None => None,
        };

        Ok(Self { tensors, scaler })
    }
}

/// Serializes `state` to a safetensors file at `path`.
pub fn write_state_dict(
    path: &Path,
    state: &StateDict,
    metadata: Option<HashMap<String, String>>,
) -> Result<()> {
    let flats: Vec<(&String, Vec<f32>, Vec<usize>)> = state
        .iter()
        .map(|(name, value)| (name, value.iter().copied().collect(), value.shape().to_vec()))
        .collect();

    let views = flats
        .iter()
        .map(|(name, flat, shape)| {
            let view = TensorView::new(Dtype::F32, shape.clone(), bytemuck::cast_slice(flat))?;
            Ok((name.as_str(), view))
        })
        .collect::<Result<Vec<_>>>()?;

    safetensors::serialize_to_file(views, &metadata, path)?;
    Ok(())
}

/// Reads a state dict written by `write_state_dict`.
pub fn read_state_dict(path: &Path) -> Result<StateDict> {
    decode_state_dict(&fs::read(path)?)
}

fn decode_state_dict(bytes: &[u8]) -> Result<StateDict> {
    let tensors = SafeTensors::deserialize(bytes)?;

    tensors
        .tensors()
        .into_iter()
        .map(|(name, view)| {
            if view.dtype() != Dtype::F32 {
                return Err(WorkerErr::Checkpoint(format!(
                    "tensor {name} has dtype {:?}, expected F32",
                    view.dtype()
                )));
            }

            let flat: Vec<f32> = view
                .data()
                .chunks_exact(4)
                .map(bytemuck::pod_read_unaligned)
                .collect();
            let value = ArrayD::from_shape_vec(IxDyn(view.shape()), flat)
                .map_err(|e| WorkerErr::Checkpoint(e.to_string()))?;

            Ok((name, value))
        })
        .collect()
}

/// The early-stopping checkpoint of one run, written only by the designated replica.
#[derive(Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    enabled: bool,
    scaler: Option<StandardScaler>,
    saves: usize,
}

impl CheckpointStore {
    /// Creates a new `CheckpointStore`.
    ///
    /// # Args
    /// * `root` - The checkpoints root directory.
    /// * `setting` - The run id, naming the run's directory under `root`.
    /// * `enabled` - Whether this replica writes; the others' calls are no-ops.
    /// * `scaler` - The fitted transform stored next to every checkpoint.
    pub fn new(
        root: &Path,
        setting: &str,
        enabled: bool,
        scaler: Option<StandardScaler>,
    ) -> Self {
        Self {
            dir: root.join(setting),
            enabled,
            scaler,
            saves: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    /// How many checkpoints this store wrote.
    pub fn saves(&self) -> usize {
        self.saves
    }

    /// Persists the trainable parameters of `model`, replacing the previous checkpoint.
    ///
    /// # Errors
    /// Write failures are fatal, peers would otherwise wait forever at the
    /// end-of-run barrier for a replica that can no longer make progress.
    pub fn save(&mut self, model: &dyn TrainableModel, trainable: &TrainableSet) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        fs::create_dir_all(&self.dir)?;
        let record = CheckpointRecord::capture(model, trainable, self.scaler.as_ref());
        record.save(&self.path())?;
        self.saves += 1;

        debug!(path:? = self.path(); "checkpoint saved");
        Ok(())
    }

    pub fn load(&self) -> Result<CheckpointRecord> {
        CheckpointRecord::load(&self.path())
    }

    /// Deletes the run's checkpoint directory and everything in it.
    pub fn remove(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(dir:? = self.dir; "no checkpoint directory to remove");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::arch::{ModelBuilder, ModelKind, ModelSpec};
    use ndarray::array;

    use super::*;

    fn model() -> Box<dyn TrainableModel> {
        let spec = ModelSpec {
            seq_len: 4,
            pred_len: 2,
            enc_in: 1,
            moving_avg: 3,
            output_attention: false,
            seed: 0,
        };
        ModelBuilder::build(ModelKind::DLinear, &spec).unwrap()
    }

    #[test]
    fn capture_skips_frozen_parameters() {
        let mut model = model();
        model
            .get_parameter_mut("trend.weight")
            .unwrap()
            .set_requires_grad(false);

        let trainable = TrainableSet::capture(model.as_ref());

        assert_eq!(trainable.len(), 3);
        assert!(!trainable.contains("trend.weight"));
        assert!(!trainable.filter(model.as_ref()).contains_key("trend.weight"));
    }

    #[test]
    fn drift_is_reported_against_the_capture() {
        let mut model = model();
        let trainable = TrainableSet::capture(model.as_ref());

        model
            .get_parameter_mut("seasonal.bias")
            .unwrap()
            .set_requires_grad(false);

        assert_eq!(trainable.drifted(model.as_ref()), vec!["seasonal.bias".to_string()]);
    }

    #[test]
    fn record_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.safetensors");
        let scaler = StandardScaler::fit(array![[1.0f32], [3.0]].view()).unwrap();
        let model = model();
        let record =
            CheckpointRecord::capture(model.as_ref(), &TrainableSet::capture(model.as_ref()), Some(&scaler));

        record.save(&path).unwrap();

        assert_eq!(CheckpointRecord::load(&path).unwrap(), record);
    }

    #[test]
    fn disabled_store_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CheckpointStore::new(dir.path(), "run", false, None);
        let model = model();

        store.save(model.as_ref(), &TrainableSet::capture(model.as_ref())).unwrap();

        assert_eq!(store.saves(), 0);
        assert!(!store.dir().exists());
    }

    #[test]
    fn remove_deletes_the_run_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CheckpointStore::new(dir.path(), "run", true, None);
        let model = model();

        store.save(model.as_ref(), &TrainableSet::capture(model.as_ref())).unwrap();
        assert!(store.path().exists());

        store.remove().unwrap();
        assert!(!store.dir().exists());
    }
}
