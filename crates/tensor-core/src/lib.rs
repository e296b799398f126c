// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Tensor metadata and reference kernels shared by the graph IR, the
//! partitioner and the accelerating provider.
//!
//! This crate provides:
//! - [`DType`]: graph element types with their ONNX type codes.
//! - [`Shape`]: a concrete, fully known shape used for live buffers.
//! - [`Dim`] / [`TensorShape`]: inferred shapes mixing concrete sizes,
//!   named symbolic parameters and unknown dimensions.
//! - [`Tensor`]: an owned buffer in native byte order.
//! - Reference f32 kernels (elementwise, matmul, softmax, layer norm,
//!   reductions, tile, slice) used by the interpreter backend.
//!
//! # Design Goals
//! - Shapes are plain data: cheap to clone, serde-friendly, hashable.
//! - Kernels validate their operands and report failures through
//!   [`TensorError`] rather than panicking.

mod dim;
mod dtype;
mod error;
mod ops;
mod shape;
mod tensor;

pub use dim::{Dim, TensorShape};
pub use dtype::DType;
pub use error::TensorError;
pub use ops::{
    binary, layer_norm, matmul, reduce, slice, softmax, tile, unary, BinaryOp, ReduceKind,
    UnaryOp,
};
pub use shape::Shape;
pub use tensor::{Tensor, TensorView};
