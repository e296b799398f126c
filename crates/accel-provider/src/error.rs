// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the execution provider.

/// Errors that can occur while claiming, compiling or running regions.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Whole-graph shape inference failed. `get_capability` turns this into
    /// an empty claim set instead of returning it.
    #[error("shape inference failed: {0}")]
    ShapeInferenceFailed(String),

    /// A target, element type or operator is not supported.
    #[error("not implemented: {what}")]
    Unimplemented { what: String },

    /// A constant initializer could not be decoded.
    #[error("invalid initializer '{name}': {detail}")]
    InvalidInitializer { name: String, detail: String },

    /// The same provider instance saw two different opsets for one domain.
    #[error(
        "inconsistent opset for domain '{domain}': recorded {recorded}, graph uses {observed}. \
         Create one provider instance for each session"
    )]
    InconsistentDomainVersion {
        domain: String,
        recorded: i64,
        observed: i64,
    },

    /// The partitioner produced regions that break an invariant.
    #[error("partition error: {0}")]
    Partition(#[from] partition_planner::PlannerError),

    /// `create_state` was called after the unit was released.
    #[error("compiled unit '{unit}' has been released")]
    StateReleased { unit: String },

    /// A single compute call failed; the unit stays usable.
    #[error("execution error in region '{region}': {detail}")]
    Execution { region: String, detail: String },

    /// Allocation from the provider's allocator failed.
    #[error("memory error: {0}")]
    Memory(#[from] memory_manager::MemoryError),

    /// A tensor kernel rejected its operands.
    #[error("tensor error: {0}")]
    Tensor(#[from] tensor_core::TensorError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ProviderError {
    pub(crate) fn unimplemented(what: impl Into<String>) -> Self {
        Self::Unimplemented { what: what.into() }
    }
}
