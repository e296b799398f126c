// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! RAII buffer guard that returns memory to the pool on drop.
//!
//! [`BufferGuard`] ties a buffer's lifetime to Rust ownership: when the
//! guard is dropped its bytes go back to the pool's free list and the
//! pool's live-bytes counter is decremented.

use crate::pool::PoolInner;
use std::sync::Arc;

/// An allocator-owned byte buffer.
///
/// Guards are `Send + Sync`; shared read access is safe because mutation
/// requires `&mut self`.
pub struct BufferGuard {
    data: Vec<u8>,
    /// Handle back to the pool for deallocation tracking.
    pool: Arc<PoolInner>,
}

impl BufferGuard {
    pub(crate) fn new(data: Vec<u8>, pool: Arc<PoolInner>) -> Self {
        Self { data, pool }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Returns the size of this allocation in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Name of the allocator that owns this buffer.
    pub fn allocator_name(&self) -> &str {
        self.pool.info().name.as_str()
    }
}

impl Drop for BufferGuard {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.data);
        self.pool.return_buffer(buffer);
    }
}

impl std::fmt::Debug for BufferGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferGuard")
            .field("allocator", &self.pool.info().name)
            .field("size_bytes", &self.data.len())
            .finish()
    }
}
