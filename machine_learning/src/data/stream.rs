use std::sync::Arc;

use ndarray::{Array2, ArrayView2, Axis, s, stack};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use super::{Batch, SeriesFrame, Split, SplitBorders, StandardScaler};
use crate::{MlErr, Result};

/// A restartable, finite source of batches, one pass per epoch.
pub trait BatchStream: Send {
    /// The amount of batches one pass yields.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts a new pass over the data.
    fn batches(&self) -> Box<dyn Iterator<Item = Batch> + '_>;

    /// Selects the epoch the next pass belongs to; streams that shuffle use it as a seed.
    fn set_epoch(&mut self, _epoch: usize) {}

    /// The transform fitted to this stream's data, if any.
    fn scaler(&self) -> Option<&StandardScaler> {
        None
    }
}

/// Window lengths shared by every split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub seq_len: usize,
    pub label_len: usize,
    pub pred_len: usize,
}

/// The sliding forecasting windows over one split of a scaled series.
#[derive(Debug, Clone)]
pub struct WindowDataset {
    data: Array2<f32>,
    marks: Array2<f32>,
    spec: WindowSpec,
}

impl WindowDataset {
    /// Builds the windows of one split.
    ///
    /// Time features are a single channel holding each row's position in the
    /// whole series, scaled to `[-0.5, 0.5]`.
    ///
    /// # Args
    /// * `frame` - The full series.
    /// * `split` - Which rows to window.
    /// * `spec` - The window lengths.
    /// * `scaler` - Applied to the split's rows when present.
    ///
    /// # Errors
    /// Propagates scaler column mismatches.
    pub fn from_frame(
        frame: &SeriesFrame,
        split: Split,
        spec: WindowSpec,
        scaler: Option<&StandardScaler>,
    ) -> Result<Self> {
        let borders = SplitBorders::new(frame.rows(), spec.seq_len);
        let (start, end) = borders.get(split);
        let rows = frame.slice_rows((start, end));

        let data = match scaler {
            Some(scaler) => scaler.transform(rows)?,
            None => rows.to_owned(),
        };

        let denom = frame.rows().saturating_sub(1).max(1) as f32;
        let marks = Array2::from_shape_fn((end - start, 1), |(i, _)| {
            (start + i) as f32 / denom - 0.5
        });

        Ok(Self { data, marks, spec })
    }

    /// Builds a dataset from raw rows, shaped `[row, channel]`.
    pub fn from_rows(data: Array2<f32>, spec: WindowSpec) -> Self {
        let denom = data.nrows().saturating_sub(1).max(1) as f32;
        let marks = Array2::from_shape_fn((data.nrows(), 1), |(i, _)| i as f32 / denom - 0.5);
        Self { data, marks, spec }
    }

    /// The amount of complete windows in the split.
    pub fn len(&self) -> usize {
        (self.data.nrows() + 1).saturating_sub(self.spec.seq_len + self.spec.pred_len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn channels(&self) -> usize {
        self.data.ncols()
    }

    pub fn spec(&self) -> WindowSpec {
        self.spec
    }

    /// Returns window `i` as `(x, y, x_mark, y_mark)`.
    ///
    /// `y` starts `label_len` rows before the end of `x` and runs `pred_len`
    /// rows past it.
    pub fn window(
        &self,
        i: usize,
    ) -> (ArrayView2<f32>, ArrayView2<f32>, ArrayView2<f32>, ArrayView2<f32>) {
        let WindowSpec {
            seq_len,
            label_len,
            pred_len,
        } = self.spec;
        let x_end = i + seq_len;
        let y_start = x_end - label_len;
        let y_end = x_end + pred_len;

        (
            self.data.slice(s![i..x_end, ..]),
            self.data.slice(s![y_start..y_end, ..]),
            self.marks.slice(s![i..x_end, ..]),
            self.marks.slice(s![y_start..y_end, ..]),
        )
    }

    /// Stacks the given windows into a batch.
    pub fn batch(&self, indices: &[usize]) -> Result<Batch> {
        let mut parts: [Vec<ArrayView2<f32>>; 4] = Default::default();

        for &i in indices {
            let (x, y, x_mark, y_mark) = self.window(i);
            parts[0].push(x);
            parts[1].push(y);
            parts[2].push(x_mark);
            parts[3].push(y_mark);
        }

        let [x, y, x_mark, y_mark] = parts.map(|views| stack(Axis(0), &views));
        Batch::new(x?, y?, x_mark?, y_mark?)
    }
}

/// Batches of a `WindowDataset`, optionally shuffled per epoch and sharded
/// across replicas.
pub struct WindowStream {
    dataset: Arc<WindowDataset>,
    scaler: Option<Arc<StandardScaler>>,
    batch_size: usize,
    drop_last: bool,
    shuffle_seed: Option<u64>,
    epoch: usize,
    rank: usize,
    world_size: usize,
}

impl WindowStream {
    /// Creates a new unsharded, unshuffled `WindowStream`.
    ///
    /// # Errors
    /// `MlErr::InvalidArgument` if `batch_size` is zero.
    pub fn new(dataset: Arc<WindowDataset>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(MlErr::InvalidArgument("batch size must be positive".into()));
        }

        Ok(Self {
            dataset,
            scaler: None,
            batch_size,
            drop_last: false,
            shuffle_seed: None,
            epoch: 0,
            rank: 0,
            world_size: 1,
        })
    }

    /// Shuffles the windows every epoch with a seed derived from `seed` and the epoch.
    pub fn shuffled(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    /// Drops a trailing partial batch.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Keeps only the batches belonging to `rank`, every replica getting the same amount.
    ///
    /// # Errors
    /// `MlErr::InvalidArgument` if `rank` is not below `world_size`.
    pub fn sharded(mut self, rank: usize, world_size: usize) -> Result<Self> {
        if rank >= world_size {
            return Err(MlErr::InvalidArgument(format!(
                "rank {rank} out of range for {world_size} replicas"
            )));
        }
        self.rank = rank;
        self.world_size = world_size;
        Ok(self)
    }

    /// Exposes `scaler` as this stream's fitted transform.
    pub fn with_scaler(mut self, scaler: Arc<StandardScaler>) -> Self {
        self.scaler = Some(scaler);
        self
    }

    fn total_batches(&self) -> usize {
        let windows = self.dataset.len();
        if self.drop_last {
            windows / self.batch_size
        } else {
            windows.div_ceil(self.batch_size)
        }
    }

    fn order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if let Some(seed) = self.shuffle_seed {
            let mut rng = StdRng::seed_from_u64(seed ^ self.epoch as u64);
            order.shuffle(&mut rng);
        }
        order
    }
}

impl BatchStream for WindowStream {
    fn len(&self) -> usize {
        self.total_batches() / self.world_size
    }

    fn batches(&self) -> Box<dyn Iterator<Item = Batch> + '_> {
        let order = self.order();
        let per_replica = self.len();
        let (rank, world_size, batch_size) = (self.rank, self.world_size, self.batch_size);

        let iter = (0..per_replica).filter_map(move |k| {
            let global = k * world_size + rank;
            let start = global * batch_size;
            let end = (start + batch_size).min(order.len());
            match self.dataset.batch(&order[start..end]) {
                Ok(batch) => Some(batch),
                Err(e) => {
                    log::error!(batch = global; "failed to assemble batch: {e}");
                    None
                }
            }
        });

        Box::new(iter)
    }

    fn set_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
    }

    fn scaler(&self) -> Option<&StandardScaler> {
        self.scaler.as_deref()
    }
}

/// A fixed list of batches replayed identically every epoch.
#[derive(Debug, Clone, Default)]
pub struct BatchList {
    batches: Vec<Batch>,
    scaler: Option<StandardScaler>,
}

impl BatchList {
    pub fn new(batches: Vec<Batch>) -> Self {
        Self {
            batches,
            scaler: None,
        }
    }

    pub fn with_scaler(mut self, scaler: StandardScaler) -> Self {
        self.scaler = Some(scaler);
        self
    }
}

impl BatchStream for BatchList {
    fn len(&self) -> usize {
        self.batches.len()
    }

    fn batches(&self) -> Box<dyn Iterator<Item = Batch> + '_> {
        Box::new(self.batches.iter().cloned())
    }

    fn scaler(&self) -> Option<&StandardScaler> {
        self.scaler.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(rows: usize) -> Arc<WindowDataset> {
        let data = Array2::from_shape_fn((rows, 2), |(r, c)| (r * 10 + c) as f32);
        let spec = WindowSpec {
            seq_len: 4,
            label_len: 2,
            pred_len: 3,
        };
        Arc::new(WindowDataset::from_rows(data, spec))
    }

    #[test]
    fn windows_overlap_by_label_length() {
        let ds = dataset(10);
        let (x, y, _, y_mark) = ds.window(1);

        assert_eq!(ds.len(), 4);
        assert_eq!(x.column(0).to_vec(), vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(y.column(0).to_vec(), vec![30.0, 40.0, 50.0, 60.0, 70.0]);
        assert_eq!(y_mark.nrows(), 5);
    }

    #[test]
    fn trailing_partial_batch_is_kept_unless_dropped() {
        let stream = WindowStream::new(dataset(10), 3).unwrap();
        let sizes: Vec<_> = stream.batches().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![3, 1]);

        let stream = WindowStream::new(dataset(10), 3).unwrap().drop_last(true);
        assert_eq!(stream.len(), 1);
    }

    #[test]
    fn shards_are_disjoint_and_equal() {
        let first = WindowStream::new(dataset(13), 1).unwrap().sharded(0, 2).unwrap();
        let second = WindowStream::new(dataset(13), 1).unwrap().sharded(1, 2).unwrap();

        let xs = |s: &WindowStream| -> Vec<f32> { s.batches().map(|b| b.x[[0, 0, 0]]).collect() };

        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 3);
        assert_eq!(xs(&first), vec![0.0, 20.0, 40.0]);
        assert_eq!(xs(&second), vec![10.0, 30.0, 50.0]);
    }

    #[test]
    fn shuffle_is_reproducible_per_epoch() {
        let mut a = WindowStream::new(dataset(30), 4).unwrap().shuffled(7);
        let b = WindowStream::new(dataset(30), 4).unwrap().shuffled(7);
        let first = |s: &WindowStream| -> Vec<f32> { s.batches().map(|b| b.x[[0, 0, 0]]).collect() };

        assert_eq!(first(&a), first(&b));

        a.set_epoch(1);
        let mut epoch0: Vec<f32> = b.batches().flat_map(|b| b.x.column(0).to_vec()).collect();
        let mut epoch1: Vec<f32> = a.batches().flat_map(|b| b.x.column(0).to_vec()).collect();
        epoch0.sort_by(f32::total_cmp);
        epoch1.sort_by(f32::total_cmp);
        assert_eq!(epoch0, epoch1);
    }
}
