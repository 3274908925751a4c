use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    str::FromStr,
};

use ndarray::{Array2, ArrayView2, s};
use serde::{Deserialize, Serialize};

use crate::{MlErr, Result};

const TRAIN_SHARE: f64 = 0.7;
const TEST_SHARE: f64 = 0.2;

/// Which columns a forecasting task reads and predicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Features {
    /// Every column in, every column out.
    M,
    /// Only the target column.
    S,
    /// Every column in, only the target (last) column scored.
    MS,
}

impl FromStr for Features {
    type Err = MlErr;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "M" => Ok(Self::M),
            "S" => Ok(Self::S),
            "MS" => Ok(Self::MS),
            _ => Err(MlErr::UnknownFeatures(s.to_string())),
        }
    }
}

impl TryFrom<String> for Features {
    type Error = MlErr;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Features> for String {
    fn from(features: Features) -> Self {
        features.to_string()
    }
}

impl fmt::Display for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Features::M => "M",
            Features::S => "S",
            Features::MS => "MS",
        };
        write!(f, "{name}")
    }
}

/// The three chronological partitions of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Vali,
    Test,
}

/// Row ranges `[start, end)` of each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitBorders {
    pub train: (usize, usize),
    pub vali: (usize, usize),
    pub test: (usize, usize),
}

impl SplitBorders {
    /// Computes the 70% / remainder / 20% borders for `rows` rows.
    ///
    /// The validation and test ranges start `seq_len` rows before their border
    /// so their first window's input lies in the previous split.
    pub fn new(rows: usize, seq_len: usize) -> Self {
        let num_train = (rows as f64 * TRAIN_SHARE) as usize;
        let num_test = (rows as f64 * TEST_SHARE) as usize;
        let num_vali = rows - num_train - num_test;

        Self {
            train: (0, num_train),
            vali: (
                num_train.saturating_sub(seq_len),
                num_train + num_vali,
            ),
            test: ((rows - num_test).saturating_sub(seq_len), rows),
        }
    }

    pub fn get(&self, split: Split) -> (usize, usize) {
        match split {
            Split::Train => self.train,
            Split::Vali => self.vali,
            Split::Test => self.test,
        }
    }
}

/// A numeric time series loaded from a CSV file, target column last.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFrame {
    columns: Vec<String>,
    values: Array2<f32>,
}

impl SeriesFrame {
    /// Builds a frame from already-ordered columns.
    ///
    /// # Errors
    /// `MlErr::SizeMismatch` if the column names don't match the values' width.
    pub fn new(columns: Vec<String>, values: Array2<f32>) -> Result<Self> {
        if columns.len() != values.ncols() {
            return Err(MlErr::SizeMismatch {
                what: "frame columns",
                got: columns.len(),
                expected: values.ncols(),
            });
        }

        Ok(Self { columns, values })
    }

    /// Reads a CSV file with a header row.
    ///
    /// A `date` column is dropped, the `target` column is moved last and, for
    /// `Features::S`, is the only column kept.
    ///
    /// # Args
    /// * `path` - The CSV file.
    /// * `features` - The task's feature mode.
    /// * `target` - The name of the predicted column.
    ///
    /// # Errors
    /// `MlErr::Io` if the file can't be read, `MlErr::Csv` on malformed rows and
    /// `MlErr::InvalidArgument` if the target column is missing.
    pub fn from_csv(path: impl AsRef<Path>, features: Features, target: &str) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Self::from_reader(reader, features, target)
    }

    /// Like `from_csv`, reading from any buffered source.
    pub fn from_reader(reader: impl BufRead, features: Features, target: &str) -> Result<Self> {
        let mut lines = reader.lines().enumerate();

        let header = match lines.next() {
            Some((_, line)) => line?,
            None => {
                return Err(MlErr::Csv {
                    line: 1,
                    detail: "missing header".into(),
                });
            }
        };

        let names: Vec<&str> = header.split(',').map(str::trim).collect();
        let target_idx = names
            .iter()
            .position(|&n| n == target)
            .ok_or_else(|| MlErr::InvalidArgument(format!("target column {target} not found")))?;

        let mut order: Vec<usize> = match features {
            Features::S => Vec::new(),
            Features::M | Features::MS => (0..names.len())
                .filter(|&i| i != target_idx && !names[i].eq_ignore_ascii_case("date"))
                .collect(),
        };
        order.push(target_idx);

        let mut flat = Vec::new();
        let mut rows = 0;

        for (idx, line) in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != names.len() {
                return Err(MlErr::Csv {
                    line: idx + 1,
                    detail: format!("expected {} fields, got {}", names.len(), fields.len()),
                });
            }

            for &col in &order {
                let value = fields[col].parse::<f32>().map_err(|e| MlErr::Csv {
                    line: idx + 1,
                    detail: format!("column {}: {e}", names[col]),
                })?;
                flat.push(value);
            }
            rows += 1;
        }

        let columns = order.iter().map(|&i| names[i].to_string()).collect();
        let values = Array2::from_shape_vec((rows, order.len()), flat)?;

        Self::new(columns, values)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> ArrayView2<f32> {
        self.values.view()
    }

    pub fn rows(&self) -> usize {
        self.values.nrows()
    }

    /// Returns the rows in `[start, end)`.
    pub fn slice_rows(&self, (start, end): (usize, usize)) -> ArrayView2<f32> {
        self.values.slice(s![start..end, ..])
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const CSV: &str = "date,OT,a,b\n2020-01-01,1,2,3\n2020-01-02,4,5,6\n";

    #[test]
    fn moves_target_last_and_drops_date() {
        let frame = SeriesFrame::from_reader(Cursor::new(CSV), Features::M, "OT").unwrap();

        assert_eq!(frame.columns(), &["a", "b", "OT"]);
        assert_eq!(frame.values().row(1).to_vec(), vec![5.0, 6.0, 4.0]);
    }

    #[test]
    fn univariate_keeps_only_target() {
        let frame = SeriesFrame::from_reader(Cursor::new(CSV), Features::S, "OT").unwrap();

        assert_eq!(frame.columns(), &["OT"]);
        assert_eq!(frame.values().column(0).to_vec(), vec![1.0, 4.0]);
    }

    #[test]
    fn missing_target_is_rejected() {
        let result = SeriesFrame::from_reader(Cursor::new(CSV), Features::M, "price");

        assert!(matches!(result, Err(MlErr::InvalidArgument(_))));
    }

    #[test]
    fn malformed_row_reports_its_line() {
        let csv = "OT,a\n1,2\n3,x\n";

        let result = SeriesFrame::from_reader(Cursor::new(csv), Features::M, "OT");

        assert!(matches!(result, Err(MlErr::Csv { line: 3, .. })));
    }

    #[test]
    fn borders_overlap_by_input_length() {
        let borders = SplitBorders::new(100, 10);

        assert_eq!(borders.train, (0, 70));
        assert_eq!(borders.vali, (60, 80));
        assert_eq!(borders.test, (70, 100));
    }

    #[test]
    fn feature_modes_parse_from_names() {
        assert_eq!("ms".parse::<Features>().unwrap(), Features::MS);
        assert!("X".parse::<Features>().is_err());
    }
}
