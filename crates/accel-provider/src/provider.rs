// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The execution provider: claims graph regions and compiles them lazily.
//!
//! ```text
//! get_capability(graph)
//!     │  shape inference ──(fails)──► Ok([])      (graph declined)
//!     │  record opsets  ──(conflict)─► Err         (fatal)
//!     │  eligibility + partition
//!     │  capture constant initializers of claimed nodes
//!     ▼
//! Vec<ComputeCapability>
//!     │  FusedNode::from_capability
//!     ▼
//! compile(&[FusedNode]) ──► Vec<NodeComputeInfo>   (shapes frozen, nothing lowered)
//! ```

use crate::codegen::{CodegenBackend, CodegenTarget, InterpreterBackend};
use crate::compile::{CompilePass, ComputeContext, FusedNode, LazyUnit, NodeComputeInfo};
use crate::{
    ComputeCapability, ConstantInitializerStore, DeclaredShapeInference, DomainVersionRegistry,
    Eligibility, KernelRegistry, ProviderConfig, ProviderError, ShapeExprContext, ShapeInference,
    PROVIDER_TYPE,
};
use memory_manager::{AllocatorRegistry, MemType, MemoryPool};
use model_ir::{Graph, Node, Validated};
use partition_planner::GraphPartitioner;
use std::sync::Arc;

/// State shared by a provider and every unit it compiled.
pub(crate) struct ProviderInner {
    pub(crate) config: ProviderConfig,
    pub(crate) target: CodegenTarget,
    pub(crate) registry: &'static KernelRegistry,
    pub(crate) domains: DomainVersionRegistry,
    pub(crate) constants: ConstantInitializerStore,
    pub(crate) shapes: ShapeExprContext,
    pub(crate) allocators: AllocatorRegistry,
    pub(crate) allocator: Arc<MemoryPool>,
    pub(crate) partitioner: GraphPartitioner,
    pub(crate) shape_inference: Box<dyn ShapeInference>,
    pub(crate) backend: Box<dyn CodegenBackend>,
}

/// An execution provider instance.
///
/// One instance serves one session: the opset of every domain is fixed by
/// the first graph it sees. Cloning shares the instance.
#[derive(Clone)]
pub struct AccelProvider {
    inner: Arc<ProviderInner>,
}

impl AccelProvider {
    /// Creates a provider with declared-shape inference and the
    /// interpreter backend.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        Self::with_components(
            config,
            Box::new(DeclaredShapeInference::new()),
            Box::new(InterpreterBackend::new()),
        )
    }

    /// Creates a provider with a custom shape inference pass and backend.
    ///
    /// # Errors
    /// [`ProviderError::Unimplemented`] for an unknown target and
    /// [`ProviderError::Config`] for a bad memory limit or strategy.
    pub fn with_components(
        config: ProviderConfig,
        shape_inference: Box<dyn ShapeInference>,
        backend: Box<dyn CodegenBackend>,
    ) -> Result<Self, ProviderError> {
        let target = config.create_target()?;
        let budget = config.parse_budget()?;
        let partitioner = GraphPartitioner::new(config.create_strategy()?);

        let allocators = AllocatorRegistry::new(budget);
        let allocator = allocators.get(config.device_id, MemType::Default);

        tracing::info!(
            "{PROVIDER_TYPE}: target {target}, backend '{}', strategy '{}', allocator {} ({budget})",
            backend.name(),
            partitioner.strategy_name(),
            allocator.info().name,
        );

        Ok(Self {
            inner: Arc::new(ProviderInner {
                constants: ConstantInitializerStore::new(Arc::clone(&allocator)),
                config,
                target,
                registry: KernelRegistry::builtin(),
                domains: DomainVersionRegistry::new(),
                shapes: ShapeExprContext::new(),
                allocators,
                allocator,
                partitioner,
                shape_inference,
                backend,
            }),
        })
    }

    /// Claims the regions of `graph` this provider will execute.
    ///
    /// Returns `Ok(vec![])` when the graph cannot be shaped.
    ///
    /// # Errors
    /// Only fatal conditions: an opset conflict with an earlier graph, a
    /// partition that breaks region invariants, or an initializer of a
    /// claimed node that cannot be captured.
    pub fn get_capability(
        &self,
        graph: &Graph<Validated>,
    ) -> Result<Vec<ComputeCapability>, ProviderError> {
        let inner = &self.inner;

        let inferred = ShapeExprContext::new();
        if let Err(e) = inner.shape_inference.infer(graph, &inferred) {
            tracing::warn!("declining graph '{}': {e}", graph.name);
            return Ok(Vec::new());
        }
        let shapes = inferred.snapshot();
        inner.shapes.merge(shapes.clone());

        for node in graph.nodes() {
            for output in node.outputs.iter().filter(|o| !o.is_empty()) {
                if !shapes.contains_key(output) {
                    tracing::info!(
                        "node '{}' ({}): output '{output}' has no inferred shape",
                        node.name,
                        node.op_type
                    );
                }
            }
        }

        inner.domains.record_all(graph.domain_to_version())?;

        let eligibility = Eligibility::new(graph, shapes, inner.registry, PROVIDER_TYPE);
        let regions =
            inner
                .partitioner
                .partition(graph, PROVIDER_TYPE, &|node: &Node| eligibility.is_supported(node))?;

        for region in &regions {
            for node in region.nodes_in_order(graph) {
                for tensor in node.tensors() {
                    if !graph.is_constant_initializer(tensor) {
                        continue;
                    }
                    if let Some(proto) = graph.initializer(tensor) {
                        inner.constants.capture(tensor, proto)?;
                    }
                }
            }
        }

        if regions.is_empty() {
            tracing::info!("No node is claimed in graph '{}'", graph.name);
        }
        Ok(regions)
    }

    /// Wraps each fused node in a lazily compiled unit.
    ///
    /// Nothing is lowered here; each unit compiles on its first
    /// `create_state`. Units of one call share a fresh id counter.
    pub fn compile(&self, fused_nodes: &[FusedNode]) -> Result<Vec<NodeComputeInfo>, ProviderError> {
        let pass = Arc::new(CompilePass::new());
        let infos: Vec<NodeComputeInfo> = fused_nodes
            .iter()
            .map(|fused| {
                let unit = LazyUnit::new(
                    Arc::clone(&fused.subgraph),
                    Arc::clone(&self.inner),
                    Arc::clone(&pass),
                );
                NodeComputeInfo::new(Arc::new(unit))
            })
            .collect();
        tracing::info!("prepared {} fused nodes for lazy compilation", infos.len());
        Ok(infos)
    }

    /// Claims and prepares `graph` in one step.
    pub fn claim_and_compile(
        &self,
        graph: &Graph<Validated>,
    ) -> Result<Vec<NodeComputeInfo>, ProviderError> {
        let fused: Vec<FusedNode> = self
            .get_capability(graph)?
            .iter()
            .map(|cap| FusedNode::from_capability(graph, cap))
            .collect();
        self.compile(&fused)
    }

    /// Context for `create_state` backed by the provider's default allocator.
    pub fn compute_context(&self) -> ComputeContext {
        ComputeContext::new(Arc::clone(&self.inner.allocator))
    }

    pub fn provider_type(&self) -> &'static str {
        PROVIDER_TYPE
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.inner.config
    }

    pub fn target(&self) -> CodegenTarget {
        self.inner.target
    }

    pub fn kernel_registry(&self) -> &'static KernelRegistry {
        self.inner.registry
    }

    pub fn domain_versions(&self) -> &DomainVersionRegistry {
        &self.inner.domains
    }

    pub fn constants(&self) -> &ConstantInitializerStore {
        &self.inner.constants
    }

    /// Shapes inferred by every `get_capability` call so far. A later
    /// graph overwrites tensors of the same name.
    pub fn shapes(&self) -> &ShapeExprContext {
        &self.inner.shapes
    }

    pub fn allocators(&self) -> &AllocatorRegistry {
        &self.inner.allocators
    }

    pub fn allocator(&self) -> &Arc<MemoryPool> {
        &self.inner.allocator
    }

    pub fn backend_name(&self) -> &str {
        self.inner.backend.name()
    }

    pub fn strategy_name(&self) -> &str {
        self.inner.partitioner.strategy_name()
    }
}

impl std::fmt::Debug for AccelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccelProvider")
            .field("target", &self.inner.target)
            .field("backend", &self.inner.backend.name())
            .field("strategy", &self.inner.partitioner.strategy_name())
            .field("constants", &self.inner.constants.len())
            .finish()
    }
}
