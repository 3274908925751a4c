use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::{MlErr, Result};

/// Per-column standardization fitted on the training rows only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl StandardScaler {
    /// Fits the scaler to `rows`, shaped `[row, column]`.
    ///
    /// Columns with zero spread get a unit deviation so they pass through centered.
    ///
    /// # Errors
    /// `MlErr::InvalidArgument` if there are no rows to fit on.
    pub fn fit(rows: ArrayView2<f32>) -> Result<Self> {
        let mean = rows
            .mean_axis(Axis(0))
            .ok_or_else(|| MlErr::InvalidArgument("cannot fit a scaler on zero rows".into()))?;
        let std = rows
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 { s } else { 1.0 });

        Ok(Self {
            mean: mean.to_vec(),
            std: std.to_vec(),
        })
    }

    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    pub fn std(&self) -> &[f32] {
        &self.std
    }

    /// Standardizes `rows` column by column.
    pub fn transform(&self, rows: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_columns(rows)?;
        let mean = Array1::from(self.mean.clone());
        let std = Array1::from(self.std.clone());
        Ok((&rows - &mean) / &std)
    }

    /// Undoes `transform`.
    pub fn inverse_transform(&self, rows: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_columns(rows)?;
        let mean = Array1::from(self.mean.clone());
        let std = Array1::from(self.std.clone());
        Ok(&rows * &std + &mean)
    }

    fn check_columns(&self, rows: ArrayView2<f32>) -> Result<()> {
        let got = rows.ncols();
        if got != self.mean.len() {
            return Err(MlErr::SizeMismatch {
                what: "scaler columns",
                got,
                expected: self.mean.len(),
            });
        }
        Ok(())
    }
}
