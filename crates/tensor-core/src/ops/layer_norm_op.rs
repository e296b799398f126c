// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Layer normalization operation.

use super::f32_operand;
use crate::{DType, Tensor, TensorError, TensorView};

/// Applies layer normalization over the trailing dimensions `dims[axis..]`:
///
/// `output = scale * (x - mean) / sqrt(var + eps) + bias`
///
/// # Arguments
/// * `input`: the input tensor.
/// * `scale`: holds exactly `prod(dims[axis..])` elements.
/// * `bias`: optional shift, same element count as `scale`.
/// * `axis`: first normalised dimension; negative values count from the end.
/// * `eps`: small constant for numerical stability (typically 1e-5).
/// * `output`: pre-allocated output tensor (same shape as `input`).
///
/// # Errors
/// Returns errors if shapes are incompatible, the axis is out of range or
/// the dtype is not F32.
pub fn layer_norm(
    input: &TensorView<'_>,
    scale: &TensorView<'_>,
    bias: Option<&TensorView<'_>>,
    axis: i64,
    eps: f32,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    let src = f32_operand("layer_norm", input)?;
    let g = f32_operand("layer_norm", scale)?;
    let b = bias.map(|v| f32_operand("layer_norm", v)).transpose()?;

    if input.shape() != output.shape() || output.dtype() != DType::F32 {
        return Err(TensorError::ShapeMismatch {
            op: "layer_norm (input vs output)",
            lhs: input.shape().clone(),
            rhs: output.shape().clone(),
        });
    }

    let dims = input.shape().dims();
    let axis_idx = input
        .shape()
        .normalize_axis(axis)
        .ok_or(TensorError::AxisOutOfRange {
            op: "layer_norm",
            axis,
            rank: dims.len(),
        })?;

    let row_len: usize = dims[axis_idx..].iter().product();
    if g.len() != row_len {
        return Err(TensorError::ShapeMismatch {
            op: "layer_norm (scale)",
            lhs: scale.shape().clone(),
            rhs: input.shape().clone(),
        });
    }
    if let (Some(bv), Some(b)) = (bias, &b) {
        if b.len() != row_len {
            return Err(TensorError::ShapeMismatch {
                op: "layer_norm (bias)",
                lhs: bv.shape().clone(),
                rhs: input.shape().clone(),
            });
        }
    }

    let mut dst = vec![0.0f32; src.len()];
    if row_len == 0 {
        return output.write_f32(&dst);
    }

    for (row_src, row_dst) in src.chunks(row_len).zip(dst.chunks_mut(row_len)) {
        let mean: f32 = row_src.iter().sum::<f32>() / row_len as f32;
        let var: f32 =
            row_src.iter().map(|&x| (x - mean) * (x - mean)).sum::<f32>() / row_len as f32;

        let inv_std = 1.0 / (var + eps).sqrt();
        for j in 0..row_len {
            let shift = b.as_ref().map_or(0.0, |b| b[j]);
            row_dst[j] = g[j] * (row_src[j] - mean) * inv_std + shift;
        }
    }

    output.write_f32(&dst)
}
