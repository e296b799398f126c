// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-manager
//!
//! Budgeted allocators for constant tensors and kernel buffers.
//!
//! # Key Components
//!
//! - [`MemoryBudget`]: a hard memory ceiling with human-readable parsing
//!   (`"512M"`, `"1G"`, etc.).
//! - [`MemoryPool`]: the allocator. Enforces the budget, maintains a free
//!   list binned by size class, and tracks statistics.
//! - [`BufferGuard`]: an RAII wrapper around allocated buffers. Dropping a
//!   guard returns the buffer to its pool.
//! - [`AllocatorRegistry`]: one pool per `(device_id, MemType)`, created on
//!   first lookup.
//! - [`AllocationStats`]: cumulative allocator metrics.
//!
//! # Ownership Model
//!
//! ```text
//! MemoryPool::allocate(size)
//!       │
//!       ▼
//!   BufferGuard  ◄─── owns Vec<u8>, holds Arc<PoolInner>
//!       │
//!       │  drop()
//!       ▼
//!   PoolInner::return_buffer()  ──► free list
//! ```
//!
//! # Example
//! ```
//! use memory_manager::{AllocatorRegistry, MemType, MemoryBudget};
//!
//! let registry = AllocatorRegistry::new(MemoryBudget::from_mb(64));
//! let pool = registry.get(0, MemType::Default);
//!
//! let a = pool.allocate(1024 * 1024).unwrap();
//! let b = pool.allocate(512 * 1024).unwrap();
//! assert_eq!(pool.allocated_bytes(), 1024 * 1024 + 512 * 1024);
//!
//! drop(a);
//! assert_eq!(pool.allocated_bytes(), 512 * 1024);
//! # drop(b);
//! ```

mod budget;
mod error;
mod guard;
pub mod pool;
mod registry;
mod stats;

pub use budget::MemoryBudget;
pub use error::MemoryError;
pub use guard::BufferGuard;
pub use pool::MemoryPool;
pub use registry::{AllocatorRegistry, MemType, MemoryInfo};
pub use stats::AllocationStats;
