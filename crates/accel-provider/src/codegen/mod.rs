// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Lowering of claimed regions into executable kernels.
//!
//! A [`CodegenBackend`] turns a [`RegionSubgraph`] into a
//! [`CompiledKernel`]. Lowering receives everything the provider knows about
//! the region through an explicit [`CodegenContext`]: the target, the
//! captured constants, the inferred shapes and the recorded opsets.

pub mod interpreter;
mod target;

pub use interpreter::InterpreterBackend;
pub use target::CodegenTarget;

use crate::compile::{KernelContext, RealizedDims};
use crate::{ConstantInitializerStore, DomainVersionRegistry, ProviderError, ShapeExprContext};
use memory_manager::MemoryPool;
use model_ir::{Graph, Node, NodeArg, Validated};
use partition_planner::ClaimedRegion;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A claimed region cut out of its graph.
///
/// Owns copies of its nodes and tensor declarations so it can outlive the
/// graph it was claimed from.
#[derive(Debug, Clone)]
pub struct RegionSubgraph {
    name: String,
    nodes: Vec<Node>,
    inputs: Vec<String>,
    /// Boundary inputs that are constant initializers. Compiled units bind
    /// these from the constant store; callers never pass them.
    constant_inputs: HashSet<String>,
    outputs: Vec<String>,
    node_args: HashMap<String, NodeArg>,
}

impl RegionSubgraph {
    /// Extracts `region` from `graph`. Nodes are kept in topological order.
    pub fn from_region(graph: &Graph<Validated>, region: &ClaimedRegion) -> Self {
        let nodes: Vec<Node> = region.nodes_in_order(graph).into_iter().cloned().collect();
        let node_args = nodes
            .iter()
            .flat_map(Node::tensors)
            .filter_map(|t| graph.node_arg(t))
            .map(|arg| (arg.name.clone(), arg.clone()))
            .collect();
        let constant_inputs = region
            .meta_def
            .inputs
            .iter()
            .filter(|t| graph.is_constant_initializer(t))
            .cloned()
            .collect();
        Self {
            name: region.meta_def.name.clone(),
            nodes,
            inputs: region.meta_def.inputs.clone(),
            constant_inputs,
            outputs: region.meta_def.outputs.clone(),
            node_args,
        }
    }

    /// Name of the fused node.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Boundary inputs in `MetaDef` order, constants included.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Boundary inputs a compute call must supply, in the order callers
    /// pass them.
    pub fn runtime_inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs
            .iter()
            .map(String::as_str)
            .filter(|t| !self.constant_inputs.contains(*t))
    }

    /// Boundary inputs read from the constant store, in `MetaDef` order.
    pub fn constant_inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs
            .iter()
            .map(String::as_str)
            .filter(|t| self.constant_inputs.contains(*t))
    }

    pub fn is_constant_input(&self, name: &str) -> bool {
        self.constant_inputs.contains(name)
    }

    /// Every tensor the region's nodes read or write.
    pub fn tensors(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().flat_map(Node::tensors)
    }

    /// Boundary outputs, in the order kernels produce them.
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn node_arg(&self, name: &str) -> Option<&NodeArg> {
        self.node_args.get(name)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }
}

/// Everything a backend may consult while lowering one region.
pub struct CodegenContext<'a> {
    pub target: CodegenTarget,
    pub constants: &'a ConstantInitializerStore,
    pub shapes: &'a ShapeExprContext,
    pub domain_versions: &'a DomainVersionRegistry,
    pub allocator: &'a Arc<MemoryPool>,
    pub enable_per_node_parallel: bool,
    /// Unique name of the unit being compiled, for diagnostics.
    pub unit_name: &'a str,
}

/// Turns region subgraphs into executable kernels.
pub trait CodegenBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Lowers `subgraph`.
    ///
    /// # Errors
    /// [`ProviderError::Unimplemented`] for operators or element types the
    /// backend cannot generate code for.
    fn lower(
        &self,
        subgraph: &RegionSubgraph,
        ctx: &CodegenContext<'_>,
    ) -> Result<Box<dyn CompiledKernel>, ProviderError>;
}

/// An executable region kernel.
///
/// `run` may be called concurrently from many threads; implementations
/// keep no per-call state outside the arguments.
pub trait CompiledKernel: Send + Sync {
    /// Reads the runtime inputs from `ctx.inputs()`, binds constant inputs
    /// itself, and stores the outputs with
    /// [`KernelContext::set_outputs`]. Symbolic dims are bound in `dims` as
    /// they are realized.
    fn run(&self, ctx: &mut KernelContext, dims: &mut RealizedDims) -> Result<(), ProviderError>;
}
