// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # accel-provider
//!
//! An execution provider that claims regions of a graph and compiles each
//! region into one fused kernel the first time it is used.
//!
//! The provider takes:
//! - A validated `Graph` from `model-ir`.
//! - A partition strategy from `partition-planner`.
//! - A default allocator from `memory-manager`.
//!
//! And produces claimed regions plus a callback triple per fused node
//! (`create_state`, `compute`, `release_state`).
//!
//! # Lifecycle
//! ```text
//! get_capability ──► Vec<ComputeCapability> ──► compile ──► Vec<NodeComputeInfo>
//!                                                               │ create_state (compiles once)
//!                                                               │ compute × N
//!                                                               ▼ release_state
//! ```
//!
//! A provider instance belongs to one session: it fixes the opset of each
//! domain on the first graph and rejects later graphs that disagree.

pub mod codegen;
mod compile;
mod config;
mod domain_registry;
mod eligibility;
mod error;
mod initializers;
mod kernel_registry;
mod provider;
mod shape_infer;

pub use codegen::{
    CodegenBackend, CodegenContext, CodegenTarget, CompiledKernel, InterpreterBackend,
    RegionSubgraph,
};
pub use compile::{
    CompilePass, ComputeContext, ComputeFn, CreateStateFn, FunctionState, FusedNode,
    KernelContext, KernelState, LazyUnit, NodeComputeInfo, RealizedDims, ReleaseStateFn,
    UnitStatus,
};
pub use config::ProviderConfig;
pub use domain_registry::DomainVersionRegistry;
pub use eligibility::Eligibility;
pub use error::ProviderError;
pub use initializers::{decode_ints, ConstantInitializerStore, ConstantTensor};
pub use kernel_registry::{KernelDef, KernelRegistry, PROVIDER_TYPE};
pub use provider::AccelProvider;
pub use shape_infer::{broadcast, DeclaredShapeInference, ShapeExprContext, ShapeInference};

/// A claimed region as reported by [`AccelProvider::get_capability`].
pub type ComputeCapability = partition_planner::ClaimedRegion;
