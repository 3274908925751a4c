use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use log::{debug, info};
use serde::Serialize;
use serde_json::json;
use worker::tracking::{RunStatus, Tracker};

static RUNS: AtomicUsize = AtomicUsize::new(0);

/// A tracking sink backed by a directory tree:
///
/// ```text
/// <root>/<experiment>/<run_id>/
///     meta.json       run id, experiment, status and timestamps
///     params.json     flattened run configuration
///     tags.json       free-form tags such as the host name
///     metrics.jsonl   one line per `log_metrics` call
///     artifacts/      copied artifact files
/// ```
#[derive(Debug)]
pub struct FileTracker {
    run_id: String,
    experiment: String,
    dir: PathBuf,
    started: u64,
    params: BTreeMap<String, String>,
    tags: BTreeMap<String, String>,
}

impl FileTracker {
    /// Creates a new run under `<root>/<experiment>/`.
    ///
    /// # Errors
    /// Any I/O failure while creating the run's directories or metadata.
    pub fn create(root: impl AsRef<Path>, experiment: &str) -> worker::Result<Self> {
        let started = millis();
        let seq = RUNS.fetch_add(1, Ordering::Relaxed);
        let run_id = format!("{started:x}-{}-{seq}", std::process::id());
        let dir = root.as_ref().join(experiment).join(&run_id);

        fs::create_dir_all(dir.join("artifacts"))?;

        let tracker = Self {
            run_id,
            experiment: experiment.to_string(),
            dir,
            started,
            params: BTreeMap::new(),
            tags: BTreeMap::new(),
        };
        tracker.write_meta("RUNNING", None)?;

        info!(run_id = tracker.run_id.as_str(), dir:? = tracker.dir; "created tracking run");
        Ok(tracker)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// The run's directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_meta(&self, status: &str, ended: Option<u64>) -> worker::Result<()> {
        let meta = json!({
            "run_id": self.run_id,
            "experiment": self.experiment,
            "status": status,
            "start_time": self.started,
            "end_time": ended,
        });
        write_json(&self.dir.join("meta.json"), &meta)
    }
}

impl Tracker for FileTracker {
    fn set_tag(&mut self, key: &str, value: &str) -> worker::Result<()> {
        self.tags.insert(key.to_string(), value.to_string());
        write_json(&self.dir.join("tags.json"), &self.tags)
    }

    fn log_params(&mut self, params: &BTreeMap<String, String>) -> worker::Result<()> {
        self.params.extend(params.clone());
        write_json(&self.dir.join("params.json"), &self.params)
    }

    fn log_metrics(&mut self, metrics: &BTreeMap<String, f32>, step: usize) -> worker::Result<()> {
        let line = json!({
            "step": step,
            "timestamp": millis(),
            "metrics": metrics,
        });

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join("metrics.jsonl"))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn log_artifact(&mut self, path: &Path, artifact_path: &str) -> worker::Result<()> {
        let mut dest = self.dir.join("artifacts").join(artifact_path);
        if dest.extension().is_none() {
            if let Some(ext) = path.extension() {
                dest.set_extension(ext);
            }
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(path, &dest)?;

        debug!(artifact = artifact_path, dest:? = dest; "logged artifact");
        Ok(())
    }

    fn finish(&mut self, status: RunStatus) -> worker::Result<()> {
        info!(run_id = self.run_id.as_str(), status:% = status; "closing tracking run");
        self.write_meta(&status.to_string(), Some(millis()))
    }
}

fn write_json(path: &Path, value: &impl Serialize) -> worker::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() * 1000 + u64::from(d.subsec_millis()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use worker::tracking::RunContext;

    use super::*;

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn run_lays_out_its_files() {
        let root = tempfile::tempdir().unwrap();
        let mut tracker = FileTracker::create(root.path(), "etth1").unwrap();
        let dir = tracker.dir().to_path_buf();

        assert!(dir.starts_with(root.path().join("etth1")));
        assert_eq!(read_json(&dir.join("meta.json"))["status"], "RUNNING");

        let params = BTreeMap::from([("seq_len".to_string(), "96".to_string())]);
        tracker.log_params(&params).unwrap();
        tracker.set_tag("hostname", "node-0").unwrap();

        let metrics = BTreeMap::from([("vali_loss".to_string(), 0.5f32)]);
        tracker.log_metrics(&metrics, 0).unwrap();
        tracker.log_metrics(&metrics, 1).unwrap();
        tracker.finish(RunStatus::Finished).unwrap();

        assert_eq!(read_json(&dir.join("params.json"))["seq_len"], "96");
        assert_eq!(read_json(&dir.join("tags.json"))["hostname"], "node-0");
        assert_eq!(read_json(&dir.join("meta.json"))["status"], "FINISHED");

        let lines = fs::read_to_string(dir.join("metrics.jsonl")).unwrap();
        let steps: Vec<u64> = lines
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["step"].as_u64().unwrap())
            .collect();
        assert_eq!(steps, [0, 1]);
    }

    #[test]
    fn artifacts_keep_their_extension() {
        let root = tempfile::tempdir().unwrap();
        let mut tracker = FileTracker::create(root.path(), "default").unwrap();

        let src = tempfile::tempdir().unwrap();
        let weights = src.path().join("model_state_dict.safetensors");
        let scaler = src.path().join("scaler.json");
        fs::write(&weights, b"weights").unwrap();
        fs::write(&scaler, b"{}").unwrap();

        tracker.log_artifact(&weights, "model_state_dict").unwrap();
        tracker.log_artifact(&scaler, "scaler.json").unwrap();

        let artifacts = tracker.dir().join("artifacts");
        assert!(artifacts.join("model_state_dict.safetensors").exists());
        assert!(artifacts.join("scaler.json").exists());
    }

    #[test]
    fn dropped_context_marks_the_run_failed() {
        let root = tempfile::tempdir().unwrap();
        let tracker = FileTracker::create(root.path(), "default").unwrap();
        let dir = tracker.dir().to_path_buf();

        let ctx = RunContext::open(Box::new(tracker), &BTreeMap::new()).unwrap();
        drop(ctx);

        assert_eq!(read_json(&dir.join("meta.json"))["status"], "FAILED");
        assert!(read_json(&dir.join("tags.json"))["hostname"].is_string());
    }

    #[test]
    fn runs_get_distinct_ids() {
        let root = tempfile::tempdir().unwrap();
        let a = FileTracker::create(root.path(), "default").unwrap();
        let b = FileTracker::create(root.path(), "default").unwrap();

        assert_ne!(a.run_id(), b.run_id());
    }
}
