// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Budgeted buffer pool.
//!
//! The [`MemoryPool`] is the allocator behind constant tensors and kernel
//! scratch buffers. It:
//!
//! 1. Enforces a hard memory ceiling; allocations that would exceed the
//!    budget return `Err(OutOfMemory)`.
//! 2. Keeps returned buffers on a free list binned by size class, so
//!    repeated executions reuse memory instead of hitting the heap.
//! 3. Tracks allocation statistics.
//!
//! # Thread Safety
//! `MemoryPool` is `Send + Sync` and is normally shared as
//! `Arc<MemoryPool>` through the [`AllocatorRegistry`](crate::AllocatorRegistry).
//!
//! # Size Classes
//! Returned buffers are binned by the next power of two of their length
//! (minimum 4 KiB). A request is served from its class when possible.

use crate::{AllocationStats, BufferGuard, MemoryBudget, MemoryError, MemoryInfo};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Minimum size class: 4 KB. Anything smaller is rounded up.
const MIN_SIZE_CLASS: usize = 4096;

/// Pool state shared between the pool and its outstanding buffer guards.
pub struct PoolInner {
    info: MemoryInfo,
    budget: MemoryBudget,
    /// Live bytes (handed out, not yet returned).
    allocated_bytes: AtomicUsize,
    /// size_class → cached buffers.
    free_buffers: Mutex<HashMap<usize, Vec<Vec<u8>>>>,
    free_list_bytes: AtomicUsize,
    stats: Mutex<AllocationStats>,
}

impl PoolInner {
    pub(crate) fn info(&self) -> &MemoryInfo {
        &self.info
    }

    /// Called by `BufferGuard::drop`.
    pub(crate) fn return_buffer(&self, buffer: Vec<u8>) {
        let size_bytes = buffer.len();
        self.allocated_bytes.fetch_sub(size_bytes, Ordering::AcqRel);

        if let Ok(mut stats) = self.stats.lock() {
            stats.record_deallocation();
        }

        if size_bytes == 0 {
            return;
        }

        if let Ok(mut free) = self.free_buffers.lock() {
            self.free_list_bytes.fetch_add(size_bytes, Ordering::AcqRel);
            free.entry(size_class_for(size_bytes))
                .or_default()
                .push(buffer);
        }
    }
}

/// A budgeted allocator for byte buffers.
///
/// # Example
/// ```
/// use memory_manager::{MemoryPool, MemoryBudget};
///
/// let pool = MemoryPool::new(MemoryBudget::from_mb(64));
///
/// let guard = pool.allocate(1024 * 1024).unwrap();
/// assert_eq!(pool.allocated_bytes(), 1024 * 1024);
///
/// // Buffer is returned when guard is dropped.
/// drop(guard);
/// assert_eq!(pool.allocated_bytes(), 0);
/// ```
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

impl MemoryPool {
    /// Creates a default-memory CPU pool with the given budget.
    pub fn new(budget: MemoryBudget) -> Self {
        Self::with_info(MemoryInfo::cpu(0), budget)
    }

    /// Creates a pool describing a specific device and memory type.
    pub fn with_info(info: MemoryInfo, budget: MemoryBudget) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                info,
                budget,
                allocated_bytes: AtomicUsize::new(0),
                free_buffers: Mutex::new(HashMap::new()),
                free_list_bytes: AtomicUsize::new(0),
                stats: Mutex::new(AllocationStats::default()),
            }),
        }
    }

    /// Allocates a zero-filled buffer of exactly `size_bytes`.
    ///
    /// A zero-byte request succeeds with an empty buffer and does not
    /// touch the budget or the free list.
    ///
    /// # Errors
    /// Returns `Err(OutOfMemory)` if the allocation would exceed the budget.
    pub fn allocate(&self, size_bytes: usize) -> Result<BufferGuard, MemoryError> {
        let budget = self.inner.budget.as_bytes();

        // Reserve the bytes atomically so concurrent callers cannot jointly
        // overshoot the budget.
        let reserved = self.inner.allocated_bytes.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |current| current.checked_add(size_bytes).filter(|&n| n <= budget),
        );
        let previous = match reserved {
            Ok(previous) => previous,
            Err(current) => {
                if let Ok(mut stats) = self.inner.stats.lock() {
                    stats.record_oom();
                }
                tracing::warn!(
                    "allocator '{}' out of memory: {size_bytes} bytes requested, {} available",
                    self.inner.info.name,
                    budget.saturating_sub(current)
                );
                return Err(MemoryError::OutOfMemory {
                    allocator: self.inner.info.name.clone(),
                    requested_bytes: size_bytes,
                    available_bytes: budget.saturating_sub(current),
                    budget_bytes: budget,
                });
            }
        };

        let reused = if size_bytes == 0 {
            None
        } else {
            self.take_cached(size_bytes)
        };
        let is_hit = reused.is_some();
        let data = reused.unwrap_or_else(|| vec![0u8; size_bytes]);

        if let Ok(mut stats) = self.inner.stats.lock() {
            stats.record_allocation(size_bytes, is_hit, previous + size_bytes);
        }

        Ok(BufferGuard::new(data, Arc::clone(&self.inner)))
    }

    /// Allocates a buffer and copies `bytes` into it.
    pub fn allocate_copy(&self, bytes: &[u8]) -> Result<BufferGuard, MemoryError> {
        let mut guard = self.allocate(bytes.len())?;
        guard.as_mut_slice().copy_from_slice(bytes);
        Ok(guard)
    }

    fn take_cached(&self, size_bytes: usize) -> Option<Vec<u8>> {
        let mut free = self.inner.free_buffers.lock().ok()?;
        let mut buf = free.get_mut(&size_class_for(size_bytes))?.pop()?;
        self.inner
            .free_list_bytes
            .fetch_sub(buf.len(), Ordering::AcqRel);
        buf.clear();
        buf.resize(size_bytes, 0);
        Some(buf)
    }

    pub fn info(&self) -> &MemoryInfo {
        &self.inner.info
    }

    /// Returns the number of bytes currently allocated (live, not yet returned).
    pub fn allocated_bytes(&self) -> usize {
        self.inner.allocated_bytes.load(Ordering::Acquire)
    }

    /// Returns the number of bytes remaining before hitting the budget.
    pub fn available_bytes(&self) -> usize {
        self.inner
            .budget
            .as_bytes()
            .saturating_sub(self.allocated_bytes())
    }

    pub fn budget(&self) -> MemoryBudget {
        self.inner.budget
    }

    /// Returns a snapshot of allocation statistics.
    pub fn stats(&self) -> AllocationStats {
        self.inner
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Drops every cached free buffer. Live buffers are unaffected.
    pub fn shrink(&self) {
        if let Ok(mut free) = self.inner.free_buffers.lock() {
            free.clear();
            self.inner.free_list_bytes.store(0, Ordering::Release);
        }
    }

    /// Returns the number of bytes held in the free list.
    pub fn free_list_bytes(&self) -> usize {
        self.inner.free_list_bytes.load(Ordering::Acquire)
    }
}

/// Smallest power of 2 that is ≥ `size` and ≥ `MIN_SIZE_CLASS`.
fn size_class_for(size: usize) -> usize {
    size.max(MIN_SIZE_CLASS).next_power_of_two()
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("info", &self.inner.info)
            .field("budget", &self.inner.budget)
            .field("allocated_bytes", &self.allocated_bytes())
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}
