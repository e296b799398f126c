// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Core tensor type and view abstractions.

use crate::{DType, Shape, TensorError};

/// An owned, n-dimensional tensor stored in contiguous memory.
///
/// # Memory Layout
/// Data is stored in row-major (C) order as a flat byte buffer in native
/// byte order. The buffer carries no alignment guarantee, so typed access
/// copies elements out with [`bytemuck::pod_collect_to_vec`] instead of
/// reinterpreting the bytes in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    dtype: DType,
    data: Vec<u8>,
}

impl Tensor {
    /// Creates a new tensor filled with zeros.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape, DType};
    /// let t = Tensor::zeros(Shape::matrix(2, 3), DType::F32);
    /// assert_eq!(t.size_bytes(), 24); // 2 * 3 * 4 bytes
    /// ```
    pub fn zeros(shape: Shape, dtype: DType) -> Self {
        let size = shape.size_bytes(dtype);
        Self {
            shape,
            dtype,
            data: vec![0u8; size],
        }
    }

    /// Creates a tensor from raw bytes.
    ///
    /// Returns an error if the buffer size does not match `shape.size_bytes(dtype)`.
    pub fn from_bytes(shape: Shape, dtype: DType, data: Vec<u8>) -> Result<Self, TensorError> {
        let expected = shape.size_bytes(dtype);
        if data.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, dtype, data })
    }

    /// Creates a tensor from a slice of `f32` values.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape};
    /// let t = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(t.to_f32_vec().unwrap(), vec![1.0, 2.0, 3.0]);
    /// ```
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        let expected_elements = shape.num_elements();
        if values.len() != expected_elements {
            return Err(TensorError::BufferSizeMismatch {
                expected: expected_elements * DType::F32.size_bytes(),
                actual: values.len() * DType::F32.size_bytes(),
            });
        }
        Ok(Self {
            shape,
            dtype: DType::F32,
            data: bytemuck::cast_slice(values).to_vec(),
        })
    }

    /// Creates an `I64` tensor from a slice of values.
    pub fn from_i64(shape: Shape, values: &[i64]) -> Result<Self, TensorError> {
        let expected_elements = shape.num_elements();
        if values.len() != expected_elements {
            return Err(TensorError::BufferSizeMismatch {
                expected: expected_elements * DType::I64.size_bytes(),
                actual: values.len() * DType::I64.size_bytes(),
            });
        }
        Ok(Self {
            shape,
            dtype: DType::I64,
            data: bytemuck::cast_slice(values).to_vec(),
        })
    }

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns an immutable view over this tensor's data.
    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            shape: &self.shape,
            dtype: self.dtype,
            data: &self.data,
        }
    }

    /// Returns the raw byte slice backing this tensor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns a mutable reference to the raw byte buffer.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consumes the tensor and returns its byte buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Returns the memory footprint of this tensor in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Copies the elements out as `f32`, widening or narrowing float types.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>, TensorError> {
        self.view().to_f32_vec()
    }

    /// Copies integer elements out as `i64`.
    pub fn to_i64_vec(&self) -> Result<Vec<i64>, TensorError> {
        self.view().to_i64_vec()
    }

    /// Overwrites the buffer with `values`.
    ///
    /// # Errors
    /// Returns [`TensorError::UnsupportedDType`] unless the tensor is `F32`,
    /// and [`TensorError::BufferSizeMismatch`] if the element count differs.
    pub fn write_f32(&mut self, values: &[f32]) -> Result<(), TensorError> {
        if self.dtype != DType::F32 {
            return Err(TensorError::UnsupportedDType {
                op: "write_f32",
                dtype: self.dtype,
            });
        }
        let bytes: &[u8] = bytemuck::cast_slice(values);
        if bytes.len() != self.data.len() {
            return Err(TensorError::BufferSizeMismatch {
                expected: self.data.len(),
                actual: bytes.len(),
            });
        }
        self.data.copy_from_slice(bytes);
        Ok(())
    }

    /// Fills an `F32` tensor with a constant value.
    pub fn fill_f32(&mut self, value: f32) -> Result<(), TensorError> {
        let values = vec![value; self.shape.num_elements()];
        self.write_f32(&values)
    }
}

/// A borrowed, read-only view over a [`Tensor`]'s data.
///
/// Views are zero-copy and tied to the lifetime of the source tensor,
/// enforced by the borrow checker.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    shape: &'a Shape,
    dtype: DType,
    data: &'a [u8],
}

impl<'a> TensorView<'a> {
    /// Creates a view from raw parts.
    ///
    /// Returns an error if `data` does not hold exactly `shape.size_bytes(dtype)` bytes.
    pub fn from_parts(shape: &'a Shape, dtype: DType, data: &'a [u8]) -> Result<Self, TensorError> {
        let expected = shape.size_bytes(dtype);
        if data.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, dtype, data })
    }

    /// Returns the shape of the viewed tensor.
    pub fn shape(&self) -> &'a Shape {
        self.shape
    }

    /// Returns the data type of the viewed tensor.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the raw byte slice.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Copies the elements out as `f32`.
    ///
    /// Only floating-point element types convert; integers are rejected so
    /// that a kernel never silently runs on reinterpreted data.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>, TensorError> {
        match self.dtype {
            DType::F32 => Ok(bytemuck::pod_collect_to_vec(self.data)),
            DType::F64 => Ok(bytemuck::pod_collect_to_vec::<u8, f64>(self.data)
                .into_iter()
                .map(|v| v as f32)
                .collect()),
            DType::F16 => Ok(bytemuck::pod_collect_to_vec::<u8, u16>(self.data)
                .into_iter()
                .map(|bits| half::f16::from_bits(bits).to_f32())
                .collect()),
            DType::BF16 => Ok(bytemuck::pod_collect_to_vec::<u8, u16>(self.data)
                .into_iter()
                .map(|bits| half::bf16::from_bits(bits).to_f32())
                .collect()),
            dtype => Err(TensorError::UnsupportedDType {
                op: "to_f32_vec",
                dtype,
            }),
        }
    }

    /// Copies signed or unsigned integer elements out as `i64`.
    pub fn to_i64_vec(&self) -> Result<Vec<i64>, TensorError> {
        let d = self.data;
        let values = match self.dtype {
            DType::I64 => bytemuck::pod_collect_to_vec::<u8, i64>(d),
            DType::I32 => widen::<i32>(d),
            DType::I16 => widen::<i16>(d),
            DType::I8 => widen::<i8>(d),
            DType::U8 | DType::Bool => widen::<u8>(d),
            DType::U16 => widen::<u16>(d),
            DType::U32 => widen::<u32>(d),
            dtype => {
                return Err(TensorError::UnsupportedDType {
                    op: "to_i64_vec",
                    dtype,
                })
            }
        };
        Ok(values)
    }
}

fn widen<T: bytemuck::Pod + Into<i64>>(data: &[u8]) -> Vec<i64> {
    bytemuck::pod_collect_to_vec::<u8, T>(data)
        .into_iter()
        .map(Into::into)
        .collect()
}
