use std::{env, path::PathBuf};

use log::debug;

use crate::error::{OrchestratorError, Result};

/// Process-wide variables set before any replica starts.
pub const PROCESS_ENV: [(&str, &str); 3] = [
    ("CURL_CA_BUNDLE", ""),
    ("PYTORCH_CUDA_ALLOC_CONF", "max_split_size_mb:64"),
    ("TOKENIZERS_PARALLELISM", "false"),
];

/// Sets `PROCESS_ENV` on the current process.
///
/// Must run before any thread is spawned, that is, before the runtime is built.
pub fn apply_process_env() {
    for (key, value) in PROCESS_ENV {
        debug!(key = key, value = value; "setting process variable");
        // SAFETY: called from `main` before the runtime or any other thread exists.
        unsafe { env::set_var(key, value) };
    }
}

/// What the binary reads from its environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub config_path: PathBuf,
    pub world_size: usize,
    pub tracking_root: PathBuf,
}

impl Launch {
    /// Resolves the launch parameters.
    ///
    /// # Args
    /// * `arg` - The first command line argument, used when `RUN_CONFIG` is unset.
    /// * `var` - Looks up an environment variable.
    ///
    /// # Errors
    /// `OrchestratorError::InvalidConfig` if no config path is given or
    /// `WORLD_SIZE` isn't a positive integer.
    pub fn resolve<F>(arg: Option<String>, var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_path = var("RUN_CONFIG").or(arg).ok_or_else(|| {
            OrchestratorError::InvalidConfig(
                "no run config given, set RUN_CONFIG or pass a path".into(),
            )
        })?;

        let world_size = match var("WORLD_SIZE") {
            Some(raw) => raw.trim().parse::<usize>().ok().filter(|n| *n > 0).ok_or_else(|| {
                OrchestratorError::InvalidConfig(format!("invalid WORLD_SIZE {raw:?}"))
            })?,
            None => 1,
        };

        let tracking_root = var("TRACKING_DIR").unwrap_or_else(|| "./mlruns".into());

        Ok(Self {
            config_path: config_path.into(),
            world_size,
            tracking_root: tracking_root.into(),
        })
    }

    /// Resolves the launch parameters from the real process environment.
    pub fn from_env() -> Result<Self> {
        Self::resolve(env::args().nth(1), |key| env::var(key).ok())
    }
}
