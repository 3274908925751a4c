#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    path::Path,
    sync::{Arc, Mutex},
};

use machine_learning::{
    arch::{Forward, Parameter, StateDict, TrainableModel},
    data::{Batch, BatchList},
};
use ndarray::{Array3, ArrayD, ArrayView3, IxDyn};
use worker::{
    RunConfig,
    checkpoint::read_state_dict,
    tracking::{RunStatus, Tracker},
};

/// Everything a `Recorder` saw.
#[derive(Debug, Default)]
pub struct Recorded {
    pub tags: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub metrics: Vec<(usize, BTreeMap<String, f32>)>,
    pub artifacts: Vec<String>,
    pub state_dict: Option<StateDict>,
    pub scaler_json: Option<String>,
    pub status: Option<RunStatus>,
}

#[derive(Clone, Default)]
pub struct Recorder(pub Arc<Mutex<Recorded>>);

impl Tracker for Recorder {
    fn set_tag(&mut self, key: &str, value: &str) -> worker::Result<()> {
        self.0.lock().unwrap().tags.insert(key.into(), value.into());
        Ok(())
    }

    fn log_params(&mut self, params: &BTreeMap<String, String>) -> worker::Result<()> {
        self.0.lock().unwrap().params.extend(params.clone());
        Ok(())
    }

    fn log_metrics(&mut self, metrics: &BTreeMap<String, f32>, step: usize) -> worker::Result<()> {
        self.0.lock().unwrap().metrics.push((step, metrics.clone()));
        Ok(())
    }

    fn log_artifact(&mut self, path: &Path, artifact_path: &str) -> worker::Result<()> {
        let mut recorded = self.0.lock().unwrap();
        recorded.artifacts.push(artifact_path.to_string());

        if artifact_path == "model_state_dict" {
            recorded.state_dict = Some(read_state_dict(path)?);
        } else {
            recorded.scaler_json = Some(std::fs::read_to_string(path)?);
        }
        Ok(())
    }

    fn finish(&mut self, status: RunStatus) -> worker::Result<()> {
        self.0.lock().unwrap().status = Some(status);
        Ok(())
    }
}

/// A model with one trainable and one frozen scalar whose evaluation outputs
/// follow a script: each switch to evaluation mode moves to the next value.
pub struct ScriptedModel {
    params: Vec<Parameter>,
    pred_len: usize,
    training: bool,
    evals: Vec<f32>,
    next_eval: usize,
}

impl ScriptedModel {
    pub fn new(pred_len: usize, evals: Vec<f32>) -> Self {
        let mut backbone = Parameter::new("backbone.weight", ArrayD::from_elem(IxDyn(&[1]), 0.5));
        backbone.set_requires_grad(false);

        Self {
            params: vec![
                backbone,
                Parameter::new("head.weight", ArrayD::from_elem(IxDyn(&[1]), 1.0)),
            ],
            pred_len,
            training: true,
            evals,
            next_eval: 0,
        }
    }

    fn current_eval(&self) -> f32 {
        self.evals[self.next_eval - 1]
    }
}

impl TrainableModel for ScriptedModel {
    fn forward(
        &mut self,
        x: ArrayView3<f32>,
        _x_mark: ArrayView3<f32>,
        _dec_inp: ArrayView3<f32>,
        _y_mark: ArrayView3<f32>,
    ) -> machine_learning::Result<Forward> {
        let (batch, _, channels) = x.dim();
        let value = if self.training {
            self.params[1].value()[[0]]
        } else {
            self.current_eval()
        };

        Ok(Forward::Output(Array3::from_elem(
            (batch, self.pred_len, channels),
            value,
        )))
    }

    fn backward(&mut self, d_out: ArrayView3<f32>) -> machine_learning::Result<()> {
        self.params[1].grad_mut()[[0]] += d_out.sum();
        Ok(())
    }

    fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut [Parameter] {
        &mut self.params
    }

    fn set_training(&mut self, training: bool) {
        if self.training && !training {
            self.next_eval += 1;
        }
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }
}

/// `n` single-window batches of zeros, windows of 4 input and 2 + 2 target steps.
pub fn zero_batches(n: usize) -> BatchList {
    let batch = Batch::new(
        Array3::zeros((1, 4, 1)),
        Array3::zeros((1, 4, 1)),
        Array3::zeros((1, 4, 1)),
        Array3::zeros((1, 4, 1)),
    )
    .unwrap();

    BatchList::new(vec![batch; n])
}

pub fn config(checkpoints: &Path, extra: &str) -> RunConfig {
    let json = format!(
        r#"{{
            "model_id": "test",
            "model": "Linear",
            "checkpoints": {checkpoints:?},
            "seq_len": 4,
            "label_len": 2,
            "pred_len": 2,
            "enc_in": 1,
            "batch_size": 1,
            "learning_rate": 0.01
            {extra}
        }}"#
    );
    serde_json::from_str(&json).unwrap()
}
