use std::{fs, path::Path};

use orchestrator::{DataProvider, OrchestratorError, Session, train};
use serde_json::{Value, json};
use worker::RunConfig;

fn write_series(dir: &Path, rows: usize) {
    let mut csv = String::from("date,load,OT\n");
    for i in 0..rows {
        let t = i as f32 * 0.2;
        csv.push_str(&format!("2016-07-01 {i:05},{},{}\n", t.sin(), (t * 0.5).cos()));
    }
    fs::write(dir.join("series.csv"), csv).unwrap();
}

fn config(dir: &Path) -> RunConfig {
    serde_json::from_value(json!({
        "model_id": "smoke",
        "model": "DLinear",
        "moving_avg": 5,
        "root_path": dir,
        "data_path": "series.csv",
        "checkpoints": dir.join("checkpoints"),
        "features": "M",
        "target": "OT",
        "enc_in": 2,
        "seq_len": 16,
        "label_len": 8,
        "pred_len": 8,
        "batch_size": 8,
        "eval_batch_size": 8,
        "train_epochs": 2,
        "itr": 2,
        "learning_rate": 0.005,
        "lradj": "type1",
        "experiment": "smoke"
    }))
    .unwrap()
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn two_replicas_train_and_record_one_run() {
    let dir = tempfile::tempdir().unwrap();
    write_series(dir.path(), 300);
    let config = config(dir.path());
    let tracking = dir.path().join("mlruns");

    let summaries = train(config.clone(), 2, &tracking).unwrap();

    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].len(), 2);
    assert_eq!(summaries[0], summaries[1]);

    let runs: Vec<_> = fs::read_dir(tracking.join("smoke"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(runs.len(), 1);
    let run = &runs[0];

    assert_eq!(read_json(&run.join("meta.json"))["status"], "FINISHED");
    assert_eq!(read_json(&run.join("params.json"))["model"], "DLinear");
    assert!(read_json(&run.join("tags.json"))["hostname"].is_string());

    let epochs: usize = summaries[0].iter().map(|s| s.epochs_run).sum();
    let lines = fs::read_to_string(run.join("metrics.jsonl")).unwrap();
    assert_eq!(lines.lines().count(), epochs);

    let artifacts = run.join("artifacts");
    assert!(artifacts.join("model_state_dict.safetensors").exists());
    let scaler = read_json(&artifacts.join("scaler.json"));
    assert_eq!(scaler["mean"].as_array().unwrap().len(), 2);

    for itr in 0..config.itr {
        let checkpoint = config
            .checkpoints
            .join(config.setting(itr))
            .join("checkpoint.safetensors");
        assert!(!checkpoint.exists());
    }
}

#[test]
fn failing_replica_does_not_hang_its_peers() {
    let dir = tempfile::tempdir().unwrap();
    write_series(dir.path(), 300);
    let config = config(dir.path());

    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, b"").unwrap();

    let provider = DataProvider::load(&config).unwrap();
    let session = Session::new(config, provider, 3, Some(blocker)).unwrap();

    match session.wait() {
        Err(OrchestratorError::WorkerError { rank, .. }) => assert_eq!(rank, 0),
        other => panic!("expected replica 0 to fail, got {other:?}"),
    }
}

#[test]
fn missing_series_fails_before_any_replica_starts() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    let err = train(config, 2, dir.path().join("mlruns")).unwrap_err();

    assert!(matches!(err, OrchestratorError::Data(_)));
    assert!(!dir.path().join("mlruns").exists());
}
