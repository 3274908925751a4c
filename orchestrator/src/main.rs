use std::process::ExitCode;

use log::{error, info};
use orchestrator::{configs, env, train};

fn main() -> ExitCode {
    env::apply_process_env();
    env_logger::init();

    let launch = match env::Launch::from_env() {
        Ok(launch) => launch,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(2);
        }
    };

    let config = match configs::load_config(&launch.config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(2);
        }
    };

    match train(config, launch.world_size, &launch.tracking_root) {
        Ok(summaries) => {
            let runs = summaries.first().map(Vec::as_slice).unwrap_or_default();
            for (itr, summary) in runs.iter().enumerate() {
                info!(
                    itr = itr,
                    epochs = summary.epochs_run,
                    early_stop = summary.early_stop.stopped,
                    best:? = summary.early_stop.best;
                    "run complete"
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("training failed: {e}");
            ExitCode::FAILURE
        }
    }
}
