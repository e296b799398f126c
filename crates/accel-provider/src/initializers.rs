// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Copies of the constant initializers used by claimed regions.
//!
//! Compilation happens after the host has taken ownership of the graph's
//! initializers, so the provider decodes its own copy of each constant it
//! needs while the graph is still visible. Decoding follows the tensor
//! protocol:
//!
//! - `raw_data` holds little-endian elements and takes precedence;
//! - otherwise the typed field matching the element type is used
//!   (`int32_data` also carries bool, 8/16-bit integers and 16-bit float
//!   bit patterns; `uint64_data` carries uint32 and uint64).
//!
//! Decoded buffers live in the provider's default allocator in native
//! byte order.

use crate::ProviderError;
use memory_manager::{BufferGuard, MemoryPool};
use model_ir::TensorProto;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tensor_core::{DType, Shape, Tensor, TensorView};

/// A decoded constant tensor.
pub struct ConstantTensor {
    name: String,
    dims: Vec<i64>,
    dtype: DType,
    shape: Shape,
    buffer: BufferGuard,
}

impl ConstantTensor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dims(&self) -> &[i64] {
        &self.dims
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Element bytes in native order.
    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    pub fn size_bytes(&self) -> usize {
        self.buffer.size_bytes()
    }

    pub fn view(&self) -> Result<TensorView<'_>, ProviderError> {
        Ok(TensorView::from_parts(&self.shape, self.dtype, self.as_bytes())?)
    }

    /// Copies the constant into an owned tensor.
    pub fn to_tensor(&self) -> Result<Tensor, ProviderError> {
        Ok(Tensor::from_bytes(
            self.shape.clone(),
            self.dtype,
            self.as_bytes().to_vec(),
        )?)
    }

    pub fn to_f32_vec(&self) -> Result<Vec<f32>, ProviderError> {
        Ok(self.view()?.to_f32_vec()?)
    }

    pub fn to_i64_vec(&self) -> Result<Vec<i64>, ProviderError> {
        Ok(self.view()?.to_i64_vec()?)
    }
}

impl std::fmt::Debug for ConstantTensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstantTensor")
            .field("name", &self.name)
            .field("dims", &self.dims)
            .field("dtype", &self.dtype)
            .field("size_bytes", &self.size_bytes())
            .finish()
    }
}

/// Name-keyed store of decoded constants, shared by every compiled unit
/// of one provider.
pub struct ConstantInitializerStore {
    allocator: Arc<MemoryPool>,
    tensors: Mutex<HashMap<String, Arc<ConstantTensor>>>,
}

impl ConstantInitializerStore {
    pub fn new(allocator: Arc<MemoryPool>) -> Self {
        Self {
            allocator,
            tensors: Mutex::new(HashMap::new()),
        }
    }

    /// Decodes `proto` and stores it under `name`.
    ///
    /// A name that is already stored is left untouched, so repeated
    /// captures are no-ops.
    pub fn capture(&self, name: &str, proto: &TensorProto) -> Result<(), ProviderError> {
        let mut tensors = self
            .tensors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if tensors.contains_key(name) {
            return Ok(());
        }

        let dtype = proto.dtype().ok_or_else(|| {
            ProviderError::unimplemented(format!(
                "element type {} of initializer '{name}'",
                proto.data_type
            ))
        })?;
        let (count, size_bytes) = byte_len(name, proto, dtype)?;
        let shape = Shape::new(proto.dims.iter().map(|&d| d as usize).collect());

        let mut buffer = self.allocator.allocate(size_bytes)?;
        unpack(name, proto, dtype, count, buffer.as_mut_slice())?;

        tracing::debug!(
            "captured initializer '{name}' ({dtype:?} {:?}, {} bytes)",
            proto.dims,
            buffer.size_bytes()
        );
        tensors.insert(
            name.to_string(),
            Arc::new(ConstantTensor {
                name: name.to_string(),
                dims: proto.dims.clone(),
                dtype,
                shape,
                buffer,
            }),
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<ConstantTensor>> {
        self.tensors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.tensors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tensors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn total_bytes(&self) -> usize {
        self.tensors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .map(|t| t.size_bytes())
            .sum()
    }

    pub fn allocator(&self) -> &Arc<MemoryPool> {
        &self.allocator
    }
}

impl std::fmt::Debug for ConstantInitializerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstantInitializerStore")
            .field("tensors", &self.len())
            .field("allocator", &self.allocator.info().name)
            .finish()
    }
}

/// Decodes an int32 or int64 initializer into an index list.
pub fn decode_ints(proto: &TensorProto) -> Result<Vec<i64>, ProviderError> {
    let dtype = match proto.dtype() {
        Some(d @ (DType::I32 | DType::I64)) => d,
        other => {
            return Err(invalid(
                &proto.name,
                format!("expected int32 or int64, got {other:?}"),
            ))
        }
    };
    let (count, size_bytes) = byte_len(&proto.name, proto, dtype)?;
    let mut bytes = vec![0u8; size_bytes];
    unpack(&proto.name, proto, dtype, count, &mut bytes)?;
    let shape = Shape::vector(count);
    Ok(TensorView::from_parts(&shape, dtype, &bytes)?.to_i64_vec()?)
}

fn invalid(name: &str, detail: impl Into<String>) -> ProviderError {
    ProviderError::InvalidInitializer {
        name: name.to_string(),
        detail: detail.into(),
    }
}

/// Element count and decoded byte size of `proto`, rejecting dims whose
/// product does not fit in `usize`.
fn byte_len(name: &str, proto: &TensorProto, dtype: DType) -> Result<(usize, usize), ProviderError> {
    let count = proto
        .element_count()
        .ok_or_else(|| invalid(name, format!("bad dims {:?}", proto.dims)))?;
    let size_bytes = count
        .checked_mul(dtype.size_bytes())
        .ok_or_else(|| invalid(name, format!("dims {:?} overflow the address space", proto.dims)))?;
    Ok((count, size_bytes))
}

fn check_len(name: &str, field: &str, len: usize, count: usize) -> Result<(), ProviderError> {
    if len != count {
        return Err(invalid(
            name,
            format!("{field} holds {len} elements, dims require {count}"),
        ));
    }
    Ok(())
}

/// Writes `count` elements of `proto` into `out` in native byte order.
fn unpack(
    name: &str,
    proto: &TensorProto,
    dtype: DType,
    count: usize,
    out: &mut [u8],
) -> Result<(), ProviderError> {
    let elem = dtype.size_bytes();

    if let Some(raw) = proto.raw_data.as_deref().filter(|r| !r.is_empty()) {
        if raw.len() != count * elem {
            return Err(invalid(
                name,
                format!("raw_data has {} bytes, expected {}", raw.len(), count * elem),
            ));
        }
        copy_le_to_native(raw, out, elem);
        return Ok(());
    }

    match dtype {
        DType::F32 => {
            check_len(name, "float_data", proto.float_data.len(), count)?;
            fill(out, proto.float_data.iter().map(|v| v.to_ne_bytes()));
        }
        DType::F64 => {
            check_len(name, "double_data", proto.double_data.len(), count)?;
            fill(out, proto.double_data.iter().map(|v| v.to_ne_bytes()));
        }
        DType::I64 => {
            check_len(name, "int64_data", proto.int64_data.len(), count)?;
            fill(out, proto.int64_data.iter().map(|v| v.to_ne_bytes()));
        }
        DType::U64 => {
            check_len(name, "uint64_data", proto.uint64_data.len(), count)?;
            fill(out, proto.uint64_data.iter().map(|v| v.to_ne_bytes()));
        }
        DType::U32 => {
            check_len(name, "uint64_data", proto.uint64_data.len(), count)?;
            fill(out, proto.uint64_data.iter().map(|&v| (v as u32).to_ne_bytes()));
        }
        DType::I32 => {
            check_len(name, "int32_data", proto.int32_data.len(), count)?;
            fill(out, proto.int32_data.iter().map(|v| v.to_ne_bytes()));
        }
        DType::I16 => {
            check_len(name, "int32_data", proto.int32_data.len(), count)?;
            fill(out, proto.int32_data.iter().map(|&v| (v as i16).to_ne_bytes()));
        }
        DType::U16 => {
            check_len(name, "int32_data", proto.int32_data.len(), count)?;
            fill(out, proto.int32_data.iter().map(|&v| (v as u16).to_ne_bytes()));
        }
        DType::F16 | DType::BF16 => {
            check_len(name, "int32_data", proto.int32_data.len(), count)?;
            if let Some(v) = proto.int32_data.iter().find(|&&v| !(0..=0xFFFF).contains(&v)) {
                return Err(invalid(
                    name,
                    format!("16-bit float pattern {v} is out of range"),
                ));
            }
            fill(out, proto.int32_data.iter().map(|&v| (v as u16).to_ne_bytes()));
        }
        DType::I8 => {
            check_len(name, "int32_data", proto.int32_data.len(), count)?;
            fill(out, proto.int32_data.iter().map(|&v| (v as i8).to_ne_bytes()));
        }
        DType::U8 => {
            check_len(name, "int32_data", proto.int32_data.len(), count)?;
            fill(out, proto.int32_data.iter().map(|&v| (v as u8).to_ne_bytes()));
        }
        DType::Bool => {
            check_len(name, "int32_data", proto.int32_data.len(), count)?;
            fill(out, proto.int32_data.iter().map(|&v| [u8::from(v != 0)]));
        }
    }
    Ok(())
}

fn fill<const N: usize>(out: &mut [u8], values: impl Iterator<Item = [u8; N]>) {
    for (dst, v) in out.chunks_exact_mut(N).zip(values) {
        dst.copy_from_slice(&v);
    }
}

fn copy_le_to_native(src: &[u8], dst: &mut [u8], elem: usize) {
    match elem {
        2 => fill(
            dst,
            src.chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]).to_ne_bytes()),
        ),
        4 => fill(
            dst,
            src.chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]).to_ne_bytes()),
        ),
        8 => fill(
            dst,
            src.chunks_exact(8).map(|c| {
                let mut b = [0u8; 8];
                b.copy_from_slice(c);
                u64::from_le_bytes(b).to_ne_bytes()
            }),
        ),
        _ => dst.copy_from_slice(src),
    }
}
