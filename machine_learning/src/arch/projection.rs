use ndarray::{Array3, ArrayView1, ArrayView2, ArrayView3, ArrayViewMut1, ArrayViewMut2, Axis, linalg};

use crate::{MlErr, Result};

/// Applies a temporal projection to every channel of every sample.
///
/// Computes `out[b, t, c] = sum_s weight[t, s] * x[b, s, c] + bias[t]`.
///
/// # Arguments
/// * `weight` - Shaped `[out_len, in_len]`.
/// * `bias` - Shaped `[out_len]`.
/// * `x` - Shaped `[batch, in_len, channel]`.
///
/// # Returns
/// The projected batch, shaped `[batch, out_len, channel]`.
pub(super) fn project(
    weight: ArrayView2<f32>,
    bias: ArrayView1<f32>,
    x: ArrayView3<f32>,
) -> Result<Array3<f32>> {
    let (out_len, in_len) = weight.dim();
    let (batch, seq_len, channels) = x.dim();

    if seq_len != in_len {
        return Err(MlErr::SizeMismatch {
            what: "input length",
            got: seq_len,
            expected: in_len,
        });
    }

    let mut out = Array3::zeros((batch, out_len, channels));

    for (mut out_b, x_b) in out.outer_iter_mut().zip(x.outer_iter()) {
        out_b
            .axis_iter_mut(Axis(1))
            .for_each(|mut col| col.assign(&bias));

        linalg::general_mat_mul(1.0, &weight, &x_b, 1.0, &mut out_b);
    }

    Ok(out)
}

/// Accumulates the parameter gradients of `project`.
///
/// # Arguments
/// * `weight_grad` - Shaped like the projection's weight.
/// * `bias_grad` - Shaped like the projection's bias.
/// * `x` - The input the forward pass saw.
/// * `d_out` - The gradient with respect to the forward pass' output.
pub(super) fn project_backward(
    mut weight_grad: ArrayViewMut2<f32>,
    mut bias_grad: ArrayViewMut1<f32>,
    x: ArrayView3<f32>,
    d_out: ArrayView3<f32>,
) -> Result<()> {
    let (batch, out_len, channels) = d_out.dim();
    let expected = (x.dim().0, weight_grad.dim().0, x.dim().2);

    if (batch, out_len, channels) != expected {
        return Err(MlErr::SizeMismatch {
            what: "output gradient",
            got: d_out.len(),
            expected: expected.0 * expected.1 * expected.2,
        });
    }

    for (d_b, x_b) in d_out.outer_iter().zip(x.outer_iter()) {
        linalg::general_mat_mul(1.0, &d_b, &x_b.t(), 1.0, &mut weight_grad);
        bias_grad += &d_b.sum_axis(Axis(1));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2};

    use super::*;

    #[test]
    fn identity_projection_keeps_input() {
        let weight = Array2::<f32>::eye(3);
        let bias = Array1::<f32>::zeros(3);
        let x = Array3::from_shape_fn((2, 3, 2), |(b, s, c)| (b * 6 + s * 2 + c) as f32);

        let out = project(weight.view(), bias.view(), x.view()).unwrap();

        assert_eq!(out, x);
    }

    #[test]
    fn bias_is_broadcast_over_channels() {
        let weight = Array2::<f32>::zeros((2, 3));
        let bias = Array1::from(vec![1.0, -1.0]);
        let x = Array3::<f32>::ones((1, 3, 4));

        let out = project(weight.view(), bias.view(), x.view()).unwrap();

        assert!(out.index_axis(Axis(1), 0).iter().all(|&v| v == 1.0));
        assert!(out.index_axis(Axis(1), 1).iter().all(|&v| v == -1.0));
    }

    #[test]
    fn rejects_wrong_input_length() {
        let weight = Array2::<f32>::zeros((2, 3));
        let bias = Array1::<f32>::zeros(2);
        let x = Array3::<f32>::zeros((1, 4, 1));

        assert!(project(weight.view(), bias.view(), x.view()).is_err());
    }

    #[test]
    fn gradients_match_hand_computation() {
        let x = Array3::from_shape_vec((1, 2, 1), vec![2.0, 3.0]).unwrap();
        let d_out = Array3::from_shape_vec((1, 1, 1), vec![0.5]).unwrap();
        let mut weight_grad = Array2::<f32>::zeros((1, 2));
        let mut bias_grad = Array1::<f32>::zeros(1);

        project_backward(weight_grad.view_mut(), bias_grad.view_mut(), x.view(), d_out.view())
            .unwrap();

        assert_eq!(weight_grad, Array2::from_shape_vec((1, 2), vec![1.0, 1.5]).unwrap());
        assert_eq!(bias_grad[0], 0.5);
    }
}
