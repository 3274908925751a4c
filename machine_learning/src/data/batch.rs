use ndarray::Array3;

use crate::{MlErr, Result};

/// One batch of forecasting windows, every tensor shaped `[batch, time, channel]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub x: Array3<f32>,
    pub y: Array3<f32>,
    pub x_mark: Array3<f32>,
    pub y_mark: Array3<f32>,
}

impl Batch {
    /// Creates a new `Batch`, checking the four tensors agree on the batch size.
    ///
    /// # Errors
    /// `MlErr::SizeMismatch` if any tensor's leading dimension differs from `x`'s.
    pub fn new(
        x: Array3<f32>,
        y: Array3<f32>,
        x_mark: Array3<f32>,
        y_mark: Array3<f32>,
    ) -> Result<Self> {
        let expected = x.dim().0;

        for (what, got) in [
            ("y batch size", y.dim().0),
            ("x_mark batch size", x_mark.dim().0),
            ("y_mark batch size", y_mark.dim().0),
        ] {
            if got != expected {
                return Err(MlErr::SizeMismatch {
                    what,
                    got,
                    expected,
                });
            }
        }

        Ok(Self {
            x,
            y,
            x_mark,
            y_mark,
        })
    }

    pub fn len(&self) -> usize {
        self.x.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
