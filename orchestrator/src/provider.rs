use std::sync::Arc;

use log::info;
use machine_learning::data::{
    SeriesFrame, Split, SplitBorders, StandardScaler, WindowDataset, WindowSpec, WindowStream,
};
use worker::{RunConfig, Streams};

use crate::error::{OrchestratorError, Result};

/// The windowed splits of one series, shared by every replica.
///
/// The series is read and scaled once; each replica gets its own streams over
/// the same datasets.
#[derive(Debug, Clone)]
pub struct DataProvider {
    train: Arc<WindowDataset>,
    vali: Arc<WindowDataset>,
    test: Arc<WindowDataset>,
    scaler: Arc<StandardScaler>,
    batch_size: usize,
    eval_batch_size: usize,
    seed: u64,
}

impl DataProvider {
    /// Loads `<root_path>/<data_path>` as configured.
    ///
    /// # Errors
    /// `OrchestratorError::Data` if the file can't be read or parsed, or any
    /// error of `from_frame`.
    pub fn load(config: &RunConfig) -> Result<Self> {
        let path = config.root_path.join(&config.data_path);
        info!(path:? = path; "loading series");

        let frame = SeriesFrame::from_csv(&path, config.features, &config.target)?;
        Self::from_frame(&frame, config)
    }

    /// Splits `frame`, fits the scaler on its train rows and windows every split.
    ///
    /// # Errors
    /// `OrchestratorError::InvalidConfig` if the channel count doesn't match
    /// `enc_in` or a split is too short to hold a single window.
    pub fn from_frame(frame: &SeriesFrame, config: &RunConfig) -> Result<Self> {
        let channels = frame.columns().len();
        if channels != config.enc_in {
            return Err(OrchestratorError::InvalidConfig(format!(
                "enc_in is {} but the series has {channels} channels",
                config.enc_in
            )));
        }

        let spec = WindowSpec {
            seq_len: config.seq_len,
            label_len: config.label_len,
            pred_len: config.pred_len,
        };

        let borders = SplitBorders::new(frame.rows(), config.seq_len);
        let scaler = StandardScaler::fit(frame.slice_rows(borders.get(Split::Train)))?;

        let window = |split: Split| -> Result<Arc<WindowDataset>> {
            let dataset = WindowDataset::from_frame(frame, split, spec, Some(&scaler))?;
            if dataset.is_empty() {
                return Err(OrchestratorError::InvalidConfig(format!(
                    "the {split:?} split of {} rows holds no window of {} + {} steps",
                    frame.rows(),
                    spec.seq_len,
                    spec.pred_len
                )));
            }
            Ok(Arc::new(dataset))
        };

        let (train, vali, test) = (window(Split::Train)?, window(Split::Vali)?, window(Split::Test)?);
        info!(
            train = train.len(),
            vali = vali.len(),
            test = test.len();
            "windowed series"
        );

        Ok(Self {
            train,
            vali,
            test,
            scaler: Arc::new(scaler),
            batch_size: config.batch_size,
            eval_batch_size: config.eval_batch_size,
            seed: config.seed,
        })
    }

    /// The transform fitted on the train split.
    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    /// Builds the streams of replica `rank` out of `world_size`.
    ///
    /// Training batches are reshuffled every epoch with the configured seed;
    /// all three splits are sharded so every replica sees the same amount of
    /// batches.
    ///
    /// # Errors
    /// `OrchestratorError::Data` if `rank` is out of range.
    pub fn streams(&self, rank: usize, world_size: usize) -> Result<Streams> {
        let train = WindowStream::new(Arc::clone(&self.train), self.batch_size)?
            .shuffled(self.seed)
            .with_scaler(Arc::clone(&self.scaler))
            .sharded(rank, world_size)?;

        let eval = |dataset: &Arc<WindowDataset>| -> Result<WindowStream> {
            Ok(WindowStream::new(Arc::clone(dataset), self.eval_batch_size)?
                .sharded(rank, world_size)?)
        };

        Ok(Streams {
            train: Box::new(train),
            vali: Box::new(eval(&self.vali)?),
            test: Box::new(eval(&self.test)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::data::BatchStream;
    use ndarray::Array2;

    use super::*;

    fn frame(rows: usize) -> SeriesFrame {
        let values = Array2::from_shape_fn((rows, 2), |(i, c)| (i as f32 * 0.1).sin() + c as f32);
        SeriesFrame::new(vec!["load".into(), "OT".into()], values).unwrap()
    }

    fn config() -> RunConfig {
        serde_json::from_str(
            r#"{"model_id": "t", "model": "Linear", "enc_in": 2, "features": "M",
                "seq_len": 8, "label_len": 4, "pred_len": 4,
                "batch_size": 4, "eval_batch_size": 2}"#,
        )
        .unwrap()
    }

    #[test]
    fn replicas_get_equal_shards() {
        let provider = DataProvider::from_frame(&frame(200), &config()).unwrap();

        let a = provider.streams(0, 3).unwrap();
        let b = provider.streams(2, 3).unwrap();

        assert_eq!(a.train.len(), b.train.len());
        assert_eq!(a.vali.len(), b.vali.len());
        assert_eq!(a.test.len(), b.test.len());
        assert!(a.train.scaler().is_some());
        assert!(a.vali.scaler().is_none());
    }

    #[test]
    fn scaler_is_fitted_on_train_rows_only() {
        let frame = frame(200);
        let config = config();
        let provider = DataProvider::from_frame(&frame, &config).unwrap();

        let borders = SplitBorders::new(frame.rows(), config.seq_len);
        let expected = StandardScaler::fit(frame.slice_rows(borders.train)).unwrap();
        assert_eq!(provider.scaler().mean(), expected.mean());
    }

    #[test]
    fn channel_mismatch_is_rejected() {
        let mut config = config();
        config.enc_in = 7;

        let err = DataProvider::from_frame(&frame(200), &config).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidConfig(_)));
    }

    #[test]
    fn too_short_series_is_rejected() {
        let err = DataProvider::from_frame(&frame(20), &config()).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidConfig(_)));
    }

    #[test]
    fn out_of_range_rank_fails() {
        let provider = DataProvider::from_frame(&frame(200), &config()).unwrap();
        assert!(provider.streams(3, 3).is_err());
    }
}
