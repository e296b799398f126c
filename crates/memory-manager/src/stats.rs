// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Allocation statistics for diagnostics.

/// Cumulative counters for one [`MemoryPool`](crate::MemoryPool).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct AllocationStats {
    /// Successful allocation requests, zero-sized ones included.
    pub allocations: u64,
    /// Allocations served from the free list.
    pub reused: u64,
    /// Allocation requests rejected by the budget.
    pub oom_count: u64,
    /// Buffers handed back to the pool.
    pub deallocations: u64,
    /// High-water mark of live bytes.
    pub peak_allocated_bytes: usize,
    /// Total bytes ever handed out.
    pub cumulative_bytes: u64,
}

impl AllocationStats {
    /// Fraction of allocations served from the free list, in `[0.0, 1.0]`.
    pub fn reuse_ratio(&self) -> f64 {
        if self.allocations == 0 {
            return 0.0;
        }
        self.reused as f64 / self.allocations as f64
    }

    /// Live buffers according to the counters.
    pub fn outstanding(&self) -> u64 {
        self.allocations.saturating_sub(self.deallocations)
    }

    pub(crate) fn record_allocation(&mut self, size: usize, reused: bool, live_bytes: usize) {
        self.allocations += 1;
        if reused {
            self.reused += 1;
        }
        self.cumulative_bytes += size as u64;
        self.peak_allocated_bytes = self.peak_allocated_bytes.max(live_bytes);
    }

    pub(crate) fn record_oom(&mut self) {
        self.oom_count += 1;
    }

    pub(crate) fn record_deallocation(&mut self) {
        self.deallocations += 1;
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        let peak_kb = self.peak_allocated_bytes as f64 / 1024.0;
        format!(
            "{} allocations ({} reused, {:.0}%), {} released, {} OOMs, peak {:.1} KB",
            self.allocations,
            self.reused,
            self.reuse_ratio() * 100.0,
            self.deallocations,
            self.oom_count,
            peak_kb,
        )
    }
}
