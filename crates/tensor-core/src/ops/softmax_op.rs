// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Softmax activation operation.

use super::f32_operand;
use crate::{DType, Tensor, TensorError, TensorView};

/// Computes softmax: `output[i] = exp(x[i] - max) / sum(exp(x - max))`.
///
/// With `coerce_2d` unset, the reduction runs along the single dimension
/// `axis`. With `coerce_2d` set, the input is viewed as a matrix
/// `[prod(dims[..axis]), prod(dims[axis..])]` and the reduction runs over
/// each row; this is the behaviour of the operator before opset 13.
///
/// Uses the numerically stable variant that subtracts the maximum value
/// before exponentiation to prevent overflow.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if input and output shapes differ,
/// [`TensorError::AxisOutOfRange`] for a bad axis and
/// [`TensorError::UnsupportedDType`] if the dtype is not `F32`.
pub fn softmax(
    input: &TensorView<'_>,
    axis: i64,
    coerce_2d: bool,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    let src = f32_operand("softmax", input)?;

    if input.shape() != output.shape() || output.dtype() != DType::F32 {
        return Err(TensorError::ShapeMismatch {
            op: "softmax",
            lhs: input.shape().clone(),
            rhs: output.shape().clone(),
        });
    }

    let dims = input.shape().dims();
    if dims.is_empty() {
        // Scalar: softmax of a single value is 1.0.
        return output.write_f32(&[1.0]);
    }

    let axis_idx = input
        .shape()
        .normalize_axis(axis)
        .ok_or(TensorError::AxisOutOfRange {
            op: "softmax",
            axis,
            rank: dims.len(),
        })?;

    let outer: usize = dims[..axis_idx].iter().product();
    let (len, inner) = if coerce_2d {
        (dims[axis_idx..].iter().product::<usize>(), 1)
    } else {
        (dims[axis_idx], dims[axis_idx + 1..].iter().product())
    };

    let mut dst = vec![0.0f32; src.len()];
    if len == 0 {
        return output.write_f32(&dst);
    }

    for o in 0..outer {
        for i in 0..inner {
            let at = |j: usize| o * len * inner + j * inner + i;

            // Find max for numerical stability.
            let max_val = (0..len)
                .map(|j| src[at(j)])
                .fold(f32::NEG_INFINITY, f32::max);

            let mut sum = 0.0f32;
            for j in 0..len {
                let e = (src[at(j)] - max_val).exp();
                dst[at(j)] = e;
                sum += e;
            }

            if sum > 0.0 {
                let inv_sum = 1.0 / sum;
                for j in 0..len {
                    dst[at(j)] *= inv_sum;
                }
            }
        }
    }

    output.write_f32(&dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Shape;

    fn approx_eq(a: &[f32], b: &[f32], tol: f32) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < tol)
    }

    #[test]
    fn test_softmax_uniform() {
        let input = Tensor::from_f32(Shape::vector(4), &[1.0; 4]).unwrap();
        let mut output = Tensor::zeros(Shape::vector(4), DType::F32);
        softmax(&input.view(), -1, false, &mut output).unwrap();
        assert!(approx_eq(&output.to_f32_vec().unwrap(), &[0.25; 4], 1e-6));
    }

    #[test]
    fn test_softmax_large_values_stable() {
        let input = Tensor::from_f32(Shape::vector(3), &[1000.0, 1001.0, 1002.0]).unwrap();
        let mut output = Tensor::zeros(Shape::vector(3), DType::F32);
        softmax(&input.view(), 0, false, &mut output).unwrap();
        let r = output.to_f32_vec().unwrap();
        assert!(r.iter().all(|x| x.is_finite()));
        assert!((r.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_softmax_along_leading_axis() {
        // Each column of [[0, 1], [0, 1]] holds equal values.
        let input = Tensor::from_f32(Shape::matrix(2, 2), &[0.0, 1.0, 0.0, 1.0]).unwrap();
        let mut output = Tensor::zeros(Shape::matrix(2, 2), DType::F32);
        softmax(&input.view(), 0, false, &mut output).unwrap();
        assert!(approx_eq(
            &output.to_f32_vec().unwrap(),
            &[0.5, 0.5, 0.5, 0.5],
            1e-6
        ));
    }

    #[test]
    fn test_softmax_coerced_rows() {
        // Axis 0 with coercion normalises over the whole tensor.
        let input = Tensor::from_f32(Shape::matrix(2, 2), &[1.0; 4]).unwrap();
        let mut output = Tensor::zeros(Shape::matrix(2, 2), DType::F32);
        softmax(&input.view(), 0, true, &mut output).unwrap();
        assert!(approx_eq(&output.to_f32_vec().unwrap(), &[0.25; 4], 1e-6));
    }

    #[test]
    fn test_softmax_bad_axis() {
        let input = Tensor::zeros(Shape::vector(2), DType::F32);
        let mut output = Tensor::zeros(Shape::vector(2), DType::F32);
        assert!(matches!(
            softmax(&input.view(), 1, false, &mut output),
            Err(TensorError::AxisOutOfRange { axis: 1, .. })
        ));
    }
}
