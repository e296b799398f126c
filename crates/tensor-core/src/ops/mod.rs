// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference f32 kernels.
//!
//! Shape-preserving operations (unary activations, softmax, layer norm)
//! write into a pre-allocated output tensor. Operations whose output shape
//! depends on their arguments (broadcasting arithmetic, matmul, reductions,
//! tile, slice) allocate and return the result.

mod elementwise;
mod layer_norm_op;
mod matmul_op;
mod reduce_op;
mod softmax_op;
mod transform_op;

pub use elementwise::{binary, unary, BinaryOp, UnaryOp};
pub use layer_norm_op::layer_norm;
pub use matmul_op::matmul;
pub use reduce_op::{reduce, ReduceKind};
pub use softmax_op::softmax;
pub use transform_op::{slice, tile};

use crate::{DType, Shape, TensorError, TensorView};

/// Reads an `F32` operand, rejecting every other dtype.
pub(crate) fn f32_operand(op: &'static str, view: &TensorView<'_>) -> Result<Vec<f32>, TensorError> {
    if view.dtype() != DType::F32 {
        return Err(TensorError::UnsupportedDType {
            op,
            dtype: view.dtype(),
        });
    }
    view.to_f32_vec()
}

/// For every element of `out`, the flat offset of the element of `input`
/// it reads under numpy broadcasting. `input` must broadcast to `out`.
pub(crate) fn broadcast_offsets(input: &Shape, out: &Shape) -> Vec<usize> {
    let rank = out.rank();
    let pad = rank - input.rank();
    let in_strides = input.strides();
    let mut offsets = Vec::with_capacity(out.num_elements());
    for_each_index(out.dims(), |idx| {
        let mut off = 0;
        for d in pad..rank {
            let size = input.dims()[d - pad];
            if size != 1 {
                off += idx[d] * in_strides[d - pad];
            }
        }
        offsets.push(off);
    });
    offsets
}

/// Visits every multi-index of `dims` in row-major order.
///
/// A rank-0 shape is visited once with an empty index; a shape containing
/// a zero dimension is not visited at all.
pub(crate) fn for_each_index(dims: &[usize], mut f: impl FnMut(&[usize])) {
    if dims.iter().any(|&d| d == 0) {
        return;
    }
    let mut idx = vec![0usize; dims.len()];
    loop {
        f(&idx);
        let mut d = dims.len();
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            idx[d] += 1;
            if idx[d] < dims[d] {
                break;
            }
            idx[d] = 0;
        }
    }
}
