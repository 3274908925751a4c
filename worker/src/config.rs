use std::{collections::BTreeMap, fmt, path::PathBuf, str::FromStr};

use machine_learning::{
    arch::{ModelKind, loss},
    data::Features,
};
use serde::{Deserialize, Serialize};

use crate::{Result, WorkerErr};

/// The learning-rate schedules a run can select by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LrPolicyKind {
    OneCycle,
    Cosine,
    /// Halves the rate every epoch.
    Type1,
    /// Fixed epoch to rate overrides.
    Type2,
    /// Keeps the rate for two epochs, then decays by 0.9 per epoch.
    Type3,
    /// Decays by 0.95 per epoch.
    Pems,
    Constant,
    /// `Type1` applied every optimizer step.
    Tst,
}

impl FromStr for LrPolicyKind {
    type Err = WorkerErr;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s.to_ascii_lowercase().as_str() {
            "one_cycle" | "onecycle" => Self::OneCycle,
            "cos" => Self::Cosine,
            "type1" => Self::Type1,
            "type2" => Self::Type2,
            "type3" => Self::Type3,
            "pems" => Self::Pems,
            "constant" => Self::Constant,
            "tst" => Self::Tst,
            _ => {
                return Err(WorkerErr::Config(format!(
                    "unknown learning rate policy {s}"
                )));
            }
        };

        Ok(kind)
    }
}

impl TryFrom<String> for LrPolicyKind {
    type Error = WorkerErr;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<LrPolicyKind> for String {
    fn from(kind: LrPolicyKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for LrPolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LrPolicyKind::OneCycle => "one_cycle",
            LrPolicyKind::Cosine => "COS",
            LrPolicyKind::Type1 => "type1",
            LrPolicyKind::Type2 => "type2",
            LrPolicyKind::Type3 => "type3",
            LrPolicyKind::Pems => "PEMS",
            LrPolicyKind::Constant => "constant",
            LrPolicyKind::Tst => "TST",
        };
        write!(f, "{name}")
    }
}

/// Every hyperparameter of a run, read once at start and shared read-only by
/// all replicas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "defaults::task_name")]
    pub task_name: String,
    pub model_id: String,
    #[serde(default = "defaults::model_comment")]
    pub model_comment: String,
    pub model: ModelKind,
    #[serde(default = "defaults::seed")]
    pub seed: u64,

    #[serde(default = "defaults::data")]
    pub data: String,
    #[serde(default = "defaults::root_path")]
    pub root_path: PathBuf,
    #[serde(default = "defaults::data_path")]
    pub data_path: String,
    #[serde(default = "defaults::features")]
    pub features: Features,
    #[serde(default = "defaults::target")]
    pub target: String,
    #[serde(default = "defaults::checkpoints")]
    pub checkpoints: PathBuf,

    #[serde(default = "defaults::seq_len")]
    pub seq_len: usize,
    #[serde(default = "defaults::label_len")]
    pub label_len: usize,
    #[serde(default = "defaults::pred_len")]
    pub pred_len: usize,

    #[serde(default = "defaults::enc_in")]
    pub enc_in: usize,
    #[serde(default = "defaults::c_out")]
    pub c_out: usize,
    #[serde(default = "defaults::moving_avg")]
    pub moving_avg: usize,
    #[serde(default)]
    pub output_attention: bool,

    #[serde(default = "defaults::one")]
    pub itr: usize,
    #[serde(default = "defaults::train_epochs")]
    pub train_epochs: usize,
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,
    #[serde(default = "defaults::eval_batch_size")]
    pub eval_batch_size: usize,
    #[serde(default = "defaults::patience")]
    pub patience: usize,
    #[serde(default)]
    pub delta: f32,
    #[serde(default = "defaults::learning_rate")]
    pub learning_rate: f32,
    #[serde(default = "defaults::des")]
    pub des: String,
    #[serde(default = "defaults::loss")]
    pub loss: String,
    #[serde(default = "defaults::metric")]
    pub metric: String,
    #[serde(default = "defaults::lradj")]
    pub lradj: LrPolicyKind,
    #[serde(default = "defaults::pct_start")]
    pub pct_start: f32,
    #[serde(default)]
    pub use_amp: bool,
    #[serde(default = "defaults::experiment")]
    pub experiment: String,
}

mod defaults {
    use std::path::PathBuf;

    use machine_learning::data::Features;

    use crate::config::LrPolicyKind;

    pub fn task_name() -> String {
        "long_term_forecast".into()
    }

    pub fn model_comment() -> String {
        "none".into()
    }

    pub fn seed() -> u64 {
        2021
    }

    pub fn data() -> String {
        "custom".into()
    }

    pub fn root_path() -> PathBuf {
        PathBuf::from("./dataset")
    }

    pub fn data_path() -> String {
        "ETTh1.csv".into()
    }

    pub fn features() -> Features {
        Features::M
    }

    pub fn target() -> String {
        "OT".into()
    }

    pub fn checkpoints() -> PathBuf {
        PathBuf::from("./checkpoints/")
    }

    pub fn seq_len() -> usize {
        96
    }

    pub fn label_len() -> usize {
        48
    }

    pub fn pred_len() -> usize {
        96
    }

    pub fn enc_in() -> usize {
        7
    }

    pub fn c_out() -> usize {
        7
    }

    pub fn moving_avg() -> usize {
        25
    }

    pub fn one() -> usize {
        1
    }

    pub fn train_epochs() -> usize {
        10
    }

    pub fn batch_size() -> usize {
        32
    }

    pub fn patience() -> usize {
        10
    }

    pub fn eval_batch_size() -> usize {
        8
    }

    pub fn learning_rate() -> f32 {
        1e-4
    }

    pub fn des() -> String {
        "test".into()
    }

    pub fn loss() -> String {
        "MSE".into()
    }

    pub fn metric() -> String {
        "MAE".into()
    }

    pub fn lradj() -> LrPolicyKind {
        LrPolicyKind::OneCycle
    }

    pub fn pct_start() -> f32 {
        0.2
    }

    pub fn experiment() -> String {
        "default".into()
    }
}

impl RunConfig {
    /// Checks the numeric invariants and resolves the loss and metric names.
    ///
    /// # Errors
    /// `WorkerErr::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("seq_len", self.seq_len),
            ("pred_len", self.pred_len),
            ("enc_in", self.enc_in),
            ("itr", self.itr),
            ("train_epochs", self.train_epochs),
            ("batch_size", self.batch_size),
            ("eval_batch_size", self.eval_batch_size),
        ];

        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(WorkerErr::Config(format!("{name} must be positive")));
        }

        if self.label_len > self.seq_len {
            return Err(WorkerErr::Config(format!(
                "label_len {} exceeds seq_len {}",
                self.label_len, self.seq_len
            )));
        }

        if !(self.pct_start > 0.0 && self.pct_start < 1.0) {
            return Err(WorkerErr::Config(format!(
                "pct_start must lie in (0, 1), got {}",
                self.pct_start
            )));
        }

        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(WorkerErr::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }

        if self.delta < 0.0 {
            return Err(WorkerErr::Config(format!(
                "delta must not be negative, got {}",
                self.delta
            )));
        }

        if self.model == ModelKind::DLinear && self.moving_avg % 2 == 0 {
            return Err(WorkerErr::Config(format!(
                "moving_avg must be odd, got {}",
                self.moving_avg
            )));
        }

        loss::get_loss_function(&self.loss).map_err(|e| WorkerErr::Config(e.to_string()))?;
        loss::get_metric_function(&self.metric).map_err(|e| WorkerErr::Config(e.to_string()))?;

        Ok(())
    }

    /// The identifier of repetition `itr`, also naming its checkpoint directory.
    pub fn setting(&self, itr: usize) -> String {
        format!(
            "{}_{}_{}_{}_ft{}_sl{}_ll{}_pl{}_{}_{}-{}",
            self.task_name,
            self.model_id,
            self.model,
            self.data,
            self.features,
            self.seq_len,
            self.label_len,
            self.pred_len,
            self.des,
            itr,
            self.model_comment
        )
    }

    /// Flattens the configuration into the string map logged to the tracking sink.
    pub fn to_params(&self) -> BTreeMap<String, String> {
        let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(self) else {
            return BTreeMap::new();
        };

        fields
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> RunConfig {
        serde_json::from_str(r#"{ "model_id": "ETTh1_96_96", "model": "DLinear" }"#).unwrap()
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config = minimal();

        assert_eq!(config.seq_len, 96);
        assert_eq!(config.label_len, 48);
        assert_eq!(config.features, Features::M);
        assert_eq!(config.lradj, LrPolicyKind::OneCycle);
        assert_eq!(config.patience, 10);
        assert_eq!(config.checkpoints, PathBuf::from("./checkpoints/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_names_fail_to_parse() {
        let policy = r#"{ "model_id": "x", "model": "Linear", "lradj": "warmup" }"#;
        let model = r#"{ "model_id": "x", "model": "TimeLLM" }"#;

        assert!(serde_json::from_str::<RunConfig>(policy).is_err());
        assert!(serde_json::from_str::<RunConfig>(model).is_err());
    }

    #[test]
    fn unknown_loss_is_a_config_error() {
        let config = RunConfig {
            loss: "huber".into(),
            ..minimal()
        };

        assert!(matches!(config.validate(), Err(WorkerErr::Config(_))));
    }

    #[test]
    fn label_longer_than_input_is_rejected() {
        let config = RunConfig {
            label_len: 100,
            ..minimal()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn params_are_flat_strings() {
        let params = minimal().to_params();

        assert_eq!(params["model"], "DLinear");
        assert_eq!(params["lradj"], "one_cycle");
        assert_eq!(params["seq_len"], "96");
        assert_eq!(params["use_amp"], "false");
    }

    #[test]
    fn setting_names_the_run() {
        assert_eq!(
            minimal().setting(0),
            "long_term_forecast_ETTh1_96_96_DLinear_custom_ftM_sl96_ll48_pl96_test_0-none"
        );
    }

    #[test]
    fn policy_names_are_case_insensitive() {
        assert_eq!("cos".parse::<LrPolicyKind>().unwrap(), LrPolicyKind::Cosine);
        assert_eq!("TST".parse::<LrPolicyKind>().unwrap(), LrPolicyKind::Tst);
    }
}
