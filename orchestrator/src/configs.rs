use std::{fs::File, io::BufReader, path::Path};

use log::info;
use worker::RunConfig;

use crate::error::{OrchestratorError, Result};

/// Reads a `RunConfig` from the JSON file at `path` and validates it.
///
/// # Errors
/// `OrchestratorError::Io` if the file can't be opened, `InvalidConfig` if it
/// doesn't parse or violates a constraint.
pub fn load_config(path: impl AsRef<Path>) -> Result<RunConfig> {
    let path = path.as_ref();
    info!(path:? = path; "loading run config");

    let reader = BufReader::new(File::open(path)?);
    let config: RunConfig = serde_json::from_reader(reader)?;
    validate(&config)?;
    Ok(config)
}

/// Validates `config` and the replica count it will run with.
pub fn validate_for(config: &RunConfig, world_size: usize) -> Result<()> {
    validate(config)?;

    if world_size == 0 {
        return Err(OrchestratorError::InvalidConfig(
            "world size must be positive".into(),
        ));
    }

    Ok(())
}

fn validate(config: &RunConfig) -> Result<()> {
    config
        .validate()
        .map_err(|e| OrchestratorError::InvalidConfig(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn minimal_config_takes_defaults() {
        let file = write(r#"{"model_id": "ETTh1_96_96", "model": "DLinear"}"#);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.seq_len, 96);
        assert_eq!(config.lradj.to_string(), "one_cycle");
        assert_eq!(config.moving_avg, 25);
    }

    #[test]
    fn unknown_model_is_rejected() {
        let file = write(r#"{"model_id": "x", "model": "TimeLLM"}"#);
        let err = load_config(file.path()).unwrap_err();

        assert!(matches!(err, OrchestratorError::InvalidConfig(_)));
    }

    #[test]
    fn unknown_loss_is_rejected() {
        let file = write(r#"{"model_id": "x", "model": "Linear", "loss": "huber"}"#);
        let err = load_config(file.path()).unwrap_err();

        assert!(matches!(err, OrchestratorError::InvalidConfig(_)));
    }

    #[test]
    fn missing_file_is_io() {
        let err = load_config("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, OrchestratorError::Io(_)));
    }

    #[test]
    fn zero_replicas_is_rejected() {
        let file = write(r#"{"model_id": "x", "model": "Linear"}"#);
        let config = load_config(file.path()).unwrap();

        assert!(validate_for(&config, 0).is_err());
        assert!(validate_for(&config, 2).is_ok());
    }
}
