// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Elementwise arithmetic and activations.

use super::{broadcast_offsets, f32_operand};
use crate::{DType, Tensor, TensorError, TensorView};

/// Binary arithmetic with numpy-style broadcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
        }
    }

    fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
        }
    }
}

/// Shape-preserving activations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Identity,
    Relu,
    Sigmoid,
    Tanh,
}

impl UnaryOp {
    fn apply(self, x: f32) -> f32 {
        match self {
            UnaryOp::Identity => x,
            UnaryOp::Relu => x.max(0.0),
            UnaryOp::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            UnaryOp::Tanh => x.tanh(),
        }
    }
}

/// Computes `lhs <op> rhs`, broadcasting both operands to a common shape.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if the shapes do not broadcast and
/// [`TensorError::UnsupportedDType`] if either operand is not `F32`.
pub fn binary(op: BinaryOp, lhs: &TensorView<'_>, rhs: &TensorView<'_>) -> Result<Tensor, TensorError> {
    let a = f32_operand(op.name(), lhs)?;
    let b = f32_operand(op.name(), rhs)?;

    let out_shape = lhs
        .shape()
        .broadcast(rhs.shape())
        .ok_or_else(|| TensorError::ShapeMismatch {
            op: op.name(),
            lhs: lhs.shape().clone(),
            rhs: rhs.shape().clone(),
        })?;

    let values: Vec<f32> = if lhs.shape() == rhs.shape() {
        a.iter().zip(&b).map(|(&x, &y)| op.apply(x, y)).collect()
    } else {
        let la = broadcast_offsets(lhs.shape(), &out_shape);
        let lb = broadcast_offsets(rhs.shape(), &out_shape);
        la.iter()
            .zip(&lb)
            .map(|(&i, &j)| op.apply(a[i], b[j]))
            .collect()
    };
    Tensor::from_f32(out_shape, &values)
}

/// Applies `op` to every element of `input`, writing into `output`.
///
/// # Errors
/// `output` must be an `F32` tensor with the same shape as `input`.
pub fn unary(op: UnaryOp, input: &TensorView<'_>, output: &mut Tensor) -> Result<(), TensorError> {
    let src = f32_operand("unary", input)?;
    if input.shape() != output.shape() || output.dtype() != DType::F32 {
        return Err(TensorError::ShapeMismatch {
            op: "unary (output)",
            lhs: input.shape().clone(),
            rhs: output.shape().clone(),
        });
    }
    let dst: Vec<f32> = src.into_iter().map(|x| op.apply(x)).collect();
    output.write_f32(&dst)
}
