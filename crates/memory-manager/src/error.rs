// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for memory management.

/// Errors that can occur during memory allocation and management.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// The requested allocation would exceed the memory budget.
    #[error("out of memory on '{allocator}': requested {requested_bytes} bytes, but only {available_bytes} available (budget: {budget_bytes})")]
    OutOfMemory {
        allocator: String,
        requested_bytes: usize,
        available_bytes: usize,
        budget_bytes: usize,
    },

    /// A budget string could not be parsed or describes zero bytes.
    #[error("invalid memory budget '{input}': {detail}")]
    InvalidBudget { input: String, detail: String },
}
