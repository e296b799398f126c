// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Axis reductions.

use super::{f32_operand, for_each_index};
use crate::{Shape, Tensor, TensorError, TensorView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceKind {
    Sum,
    Mean,
    Max,
}

/// Reduces `input` over `axes`.
///
/// An empty `axes` list reduces over every dimension. Negative axes count
/// from the end and duplicates are ignored. With `keepdims` the reduced
/// dimensions are kept with size 1; otherwise they are removed.
pub fn reduce(
    kind: ReduceKind,
    input: &TensorView<'_>,
    axes: &[i64],
    keepdims: bool,
) -> Result<Tensor, TensorError> {
    let src = f32_operand("reduce", input)?;
    let shape = input.shape();
    let rank = shape.rank();

    let mut reduced = vec![false; rank];
    if axes.is_empty() {
        reduced.iter_mut().for_each(|r| *r = true);
    }
    for &axis in axes {
        let a = shape
            .normalize_axis(axis)
            .ok_or(TensorError::AxisOutOfRange {
                op: "reduce",
                axis,
                rank,
            })?;
        reduced[a] = true;
    }

    let kept_dims: Vec<usize> = shape
        .dims()
        .iter()
        .zip(&reduced)
        .map(|(&d, &r)| if r { 1 } else { d })
        .collect();
    let kept = Shape::new(kept_dims.clone());
    let strides = kept.strides();

    let init = match kind {
        ReduceKind::Max => f32::NEG_INFINITY,
        ReduceKind::Sum | ReduceKind::Mean => 0.0,
    };
    let mut acc = vec![init; kept.num_elements()];
    let mut pos = 0usize;
    for_each_index(shape.dims(), |idx| {
        let off: usize = (0..rank)
            .filter(|&d| !reduced[d])
            .map(|d| idx[d] * strides[d])
            .sum();
        let v = src[pos];
        pos += 1;
        match kind {
            ReduceKind::Max => acc[off] = acc[off].max(v),
            ReduceKind::Sum | ReduceKind::Mean => acc[off] += v,
        }
    });

    if kind == ReduceKind::Mean {
        let count: usize = shape
            .dims()
            .iter()
            .zip(&reduced)
            .filter(|&(_, &r)| r)
            .map(|(&d, _)| d)
            .product();
        let denom = count as f32;
        acc.iter_mut().for_each(|v| *v /= denom);
    }

    let out_shape = if keepdims {
        kept
    } else {
        Shape::new(
            kept_dims
                .into_iter()
                .zip(&reduced)
                .filter(|&(_, &r)| !r)
                .map(|(d, _)| d)
                .collect(),
        )
    };
    Tensor::from_f32(out_shape, &acc)
}
