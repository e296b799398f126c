// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Serialized initializer tensors.
//!
//! A [`TensorProto`] stores its payload either as little-endian `raw_data`
//! or in one of the typed fields, mirroring the ONNX wire layout:
//!
//! | field         | element types                                             |
//! |---------------|-----------------------------------------------------------|
//! | `float_data`  | float                                                     |
//! | `double_data` | double                                                    |
//! | `int32_data`  | bool, int8, uint8, int16, uint16, int32, float16*, bfloat16* |
//! | `int64_data`  | int64                                                     |
//! | `uint64_data` | uint32, uint64                                            |
//!
//! \* 16-bit floats are stored as their bit patterns.
//!
//! Decoding into native buffers is the consumer's job; this type only
//! carries the serialized form.

use tensor_core::DType;

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TensorProto {
    pub name: String,
    #[serde(default)]
    pub dims: Vec<i64>,
    /// ONNX `TensorProto.DataType` code.
    pub data_type: i32,
    /// Little-endian packed elements. Takes precedence over the typed fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub float_data: Vec<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub double_data: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub int32_data: Vec<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub int64_data: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uint64_data: Vec<u64>,
}

impl TensorProto {
    /// Builds an f32 initializer in the `float_data` field.
    pub fn from_f32(name: impl Into<String>, dims: Vec<i64>, values: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            dims,
            data_type: DType::F32.onnx_code(),
            float_data: values,
            ..Default::default()
        }
    }

    /// Builds an int64 initializer in the `int64_data` field.
    pub fn from_i64(name: impl Into<String>, dims: Vec<i64>, values: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            dims,
            data_type: DType::I64.onnx_code(),
            int64_data: values,
            ..Default::default()
        }
    }

    /// Builds an initializer whose payload is little-endian raw bytes.
    pub fn from_raw(name: impl Into<String>, dims: Vec<i64>, dtype: DType, raw: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            dims,
            data_type: dtype.onnx_code(),
            raw_data: Some(raw),
            ..Default::default()
        }
    }

    /// Returns the element type, or `None` for types this workspace cannot hold.
    pub fn dtype(&self) -> Option<DType> {
        DType::from_onnx(self.data_type)
    }

    /// Product of `dims`, or `None` if a dimension is negative or the
    /// product overflows. A rank-0 initializer holds one element.
    pub fn element_count(&self) -> Option<usize> {
        self.dims.iter().try_fold(1usize, |acc, &d| {
            usize::try_from(d).ok().and_then(|d| acc.checked_mul(d))
        })
    }

    pub fn has_raw_data(&self) -> bool {
        self.raw_data.is_some()
    }
}
