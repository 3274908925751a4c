use std::{collections::BTreeMap, env, fmt, fs, path::Path};

use log::warn;
use machine_learning::arch::StateDict;

use crate::{Result, checkpoint::write_state_dict};

/// How a tracked run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Finished,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Finished => write!(f, "FINISHED"),
            RunStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// The experiment-tracking sink.
pub trait Tracker: Send {
    fn set_tag(&mut self, key: &str, value: &str) -> Result<()>;

    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<()>;

    /// Records scalar metrics at `step`, the epoch index.
    fn log_metrics(&mut self, metrics: &BTreeMap<String, f32>, step: usize) -> Result<()>;

    /// Copies the file at `path` into the run's artifacts as `artifact_path`.
    fn log_artifact(&mut self, path: &Path, artifact_path: &str) -> Result<()>;

    /// Stores `state` as a safetensors artifact named `artifact_path`.
    fn log_state_dict(&mut self, state: &StateDict, artifact_path: &str) -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(format!("{artifact_path}.safetensors"));

        write_state_dict(&path, state, None)?;
        self.log_artifact(&path, artifact_path)
    }

    fn finish(&mut self, status: RunStatus) -> Result<()>;
}

impl<T: Tracker + ?Sized> Tracker for Box<T> {
    fn set_tag(&mut self, key: &str, value: &str) -> Result<()> {
        (**self).set_tag(key, value)
    }

    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<()> {
        (**self).log_params(params)
    }

    fn log_metrics(&mut self, metrics: &BTreeMap<String, f32>, step: usize) -> Result<()> {
        (**self).log_metrics(metrics, step)
    }

    fn log_artifact(&mut self, path: &Path, artifact_path: &str) -> Result<()> {
        (**self).log_artifact(path, artifact_path)
    }

    fn log_state_dict(&mut self, state: &StateDict, artifact_path: &str) -> Result<()> {
        (**self).log_state_dict(state, artifact_path)
    }

    fn finish(&mut self, status: RunStatus) -> Result<()> {
        (**self).finish(status)
    }
}

/// A sink that drops everything, used by non-designated replicas.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTracker;

impl Tracker for NullTracker {
    fn set_tag(&mut self, _key: &str, _value: &str) -> Result<()> {
        Ok(())
    }

    fn log_params(&mut self, _params: &BTreeMap<String, String>) -> Result<()> {
        Ok(())
    }

    fn log_metrics(&mut self, _metrics: &BTreeMap<String, f32>, _step: usize) -> Result<()> {
        Ok(())
    }

    fn log_artifact(&mut self, _path: &Path, _artifact_path: &str) -> Result<()> {
        Ok(())
    }

    fn log_state_dict(&mut self, _state: &StateDict, _artifact_path: &str) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self, _status: RunStatus) -> Result<()> {
        Ok(())
    }
}

/// An open tracked run.
///
/// Closing is explicit; a context dropped without `close` finishes its run as
/// `RunStatus::Failed`, covering early returns and panics.
pub struct RunContext {
    tracker: Box<dyn Tracker>,
    closed: bool,
}

impl RunContext {
    /// Opens a run: tags it with the host name and logs `params`.
    pub fn open(mut tracker: Box<dyn Tracker>, params: &BTreeMap<String, String>) -> Result<Self> {
        tracker.set_tag("hostname", &hostname())?;
        tracker.log_params(params)?;

        Ok(Self {
            tracker,
            closed: false,
        })
    }

    /// A context that tracks nothing.
    pub fn detached() -> Self {
        Self {
            tracker: Box::new(NullTracker),
            closed: false,
        }
    }

    pub fn tracker(&mut self) -> &mut dyn Tracker {
        self.tracker.as_mut()
    }

    pub fn close(mut self, status: RunStatus) -> Result<()> {
        self.closed = true;
        self.tracker.finish(status)
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        if let Err(e) = self.tracker.finish(RunStatus::Failed) {
            warn!("failed to close tracking run: {e}");
        }
    }
}

fn hostname() -> String {
    env::var("HOSTNAME")
        .ok()
        .or_else(|| fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct Calls(Arc<Mutex<Vec<String>>>);

    impl Tracker for Calls {
        fn set_tag(&mut self, key: &str, _value: &str) -> Result<()> {
            self.0.lock().unwrap().push(format!("tag {key}"));
            Ok(())
        }

        fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<()> {
            self.0.lock().unwrap().push(format!("params {}", params.len()));
            Ok(())
        }

        fn log_metrics(&mut self, _: &BTreeMap<String, f32>, step: usize) -> Result<()> {
            self.0.lock().unwrap().push(format!("metrics {step}"));
            Ok(())
        }

        fn log_artifact(&mut self, path: &Path, artifact_path: &str) -> Result<()> {
            assert!(path.exists());
            self.0.lock().unwrap().push(format!("artifact {artifact_path}"));
            Ok(())
        }

        fn finish(&mut self, status: RunStatus) -> Result<()> {
            self.0.lock().unwrap().push(format!("finish {status}"));
            Ok(())
        }
    }

    #[test]
    fn open_tags_host_and_logs_params() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let params = BTreeMap::from([("seed".to_string(), "1".to_string())]);

        let context = RunContext::open(Box::new(Calls(calls.clone())), &params).unwrap();
        context.close(RunStatus::Finished).unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["tag hostname", "params 1", "finish FINISHED"]
        );
    }

    #[test]
    fn dropped_context_fails_the_run() {
        let calls = Arc::new(Mutex::new(Vec::new()));

        {
            let mut context = RunContext::open(Box::new(Calls(calls.clone())), &BTreeMap::new()).unwrap();
            context.tracker().log_metrics(&BTreeMap::new(), 3).unwrap();
        }

        assert_eq!(calls.lock().unwrap().last().unwrap(), "finish FAILED");
    }

    #[test]
    fn state_dicts_are_logged_through_a_temporary_file() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut tracker = Calls(calls.clone());
        let state = StateDict::from([("w".to_string(), ndarray::ArrayD::zeros(ndarray::IxDyn(&[2])))]);

        tracker.log_state_dict(&state, "model_state_dict").unwrap();

        assert_eq!(calls.lock().unwrap()[0], "artifact model_state_dict");
    }
}
