// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Lazy compilation of fused nodes.
//!
//! ```text
//! LazyUnit: Uncompiled
//!     │  create_state()   (lowers the region once, under the unit lock)
//!     ▼
//! LazyUnit: Active(Arc<KernelState>)
//!     │  compute() × N    (concurrent, lock-free)
//!     │  release_state()
//!     ▼
//! LazyUnit: Released      (create_state → StateReleased)
//! ```
//!
//! Compute calls own an `Arc` of the kernel state, so releasing a unit
//! never frees a state that a running call still uses.

use crate::codegen::{CodegenContext, CompiledKernel, RegionSubgraph};
use crate::provider::ProviderInner;
use crate::{ComputeCapability, ProviderError, ShapeExprContext};
use memory_manager::MemoryPool;
use model_ir::{Graph, Validated};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tensor_core::{Dim, Shape, Tensor, TensorShape};

// ── Inputs and contexts ────────────────────────────────────────

/// A claimed region handed to [`compile`](crate::AccelProvider::compile).
#[derive(Debug, Clone)]
pub struct FusedNode {
    pub(crate) subgraph: Arc<RegionSubgraph>,
}

impl FusedNode {
    /// Cuts `capability` out of `graph`; the fused node takes the region's
    /// `MetaDef` name.
    pub fn from_capability(graph: &Graph<Validated>, capability: &ComputeCapability) -> Self {
        Self {
            subgraph: Arc::new(RegionSubgraph::from_region(graph, capability)),
        }
    }

    pub fn name(&self) -> &str {
        self.subgraph.name()
    }

    pub fn subgraph(&self) -> &RegionSubgraph {
        &self.subgraph
    }
}

/// Host resources available when a state is created.
#[derive(Debug, Clone)]
pub struct ComputeContext {
    allocator: Arc<MemoryPool>,
}

impl ComputeContext {
    pub fn new(allocator: Arc<MemoryPool>) -> Self {
        Self { allocator }
    }

    pub fn allocator(&self) -> &Arc<MemoryPool> {
        &self.allocator
    }
}

/// Inputs and outputs of one compute call.
///
/// Inputs are the region's runtime inputs in `MetaDef` order; constant
/// initializers are bound by the compiled unit and never passed here.
#[derive(Debug, Default)]
pub struct KernelContext {
    inputs: Vec<Tensor>,
    outputs: Vec<Tensor>,
}

impl KernelContext {
    pub fn new(inputs: Vec<Tensor>) -> Self {
        Self {
            inputs,
            outputs: Vec::new(),
        }
    }

    pub fn inputs(&self) -> &[Tensor] {
        &self.inputs
    }

    pub fn input(&self, index: usize) -> Option<&Tensor> {
        self.inputs.get(index)
    }

    pub fn set_outputs(&mut self, outputs: Vec<Tensor>) {
        self.outputs = outputs;
    }

    pub fn outputs(&self) -> &[Tensor] {
        &self.outputs
    }

    pub fn into_outputs(self) -> Vec<Tensor> {
        self.outputs
    }
}

/// Symbolic dimension bindings of one compute call.
///
/// The first tensor that realizes a parameter binds it; every later
/// tensor must agree.
#[derive(Debug, Clone, Default)]
pub struct RealizedDims {
    bound: HashMap<String, i64>,
}

impl RealizedDims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `param` to `value`. Returns `false` if it is already bound to
    /// a different value.
    pub fn bind(&mut self, param: &str, value: i64) -> bool {
        *self.bound.entry(param.to_string()).or_insert(value) == value
    }

    pub fn get(&self, param: &str) -> Option<i64> {
        self.bound.get(param).copied()
    }

    /// Concrete shape of `shape` under the current bindings, if every
    /// dim is known.
    pub fn resolve(&self, shape: &TensorShape) -> Option<Shape> {
        shape
            .dims()
            .iter()
            .map(|d| match d {
                Dim::Value(v) => usize::try_from(*v).ok(),
                Dim::Param(p) => self.get(p).and_then(|v| usize::try_from(v).ok()),
                Dim::Unknown => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Shape::new)
    }

    /// Checks `actual` against `declared`, binding new parameters.
    pub fn check(
        &mut self,
        region: &str,
        tensor: &str,
        declared: &TensorShape,
        actual: &Shape,
    ) -> Result<(), ProviderError> {
        let mismatch = |detail: String| ProviderError::Execution {
            region: region.to_string(),
            detail: format!("tensor '{tensor}': {detail}"),
        };
        if declared.rank() != actual.rank() {
            return Err(mismatch(format!("expected shape {declared}, got {actual}")));
        }
        for (dim, &size) in declared.dims().iter().zip(actual.dims()) {
            let size = size as i64;
            match dim {
                Dim::Value(v) if *v != size => {
                    return Err(mismatch(format!("expected shape {declared}, got {actual}")));
                }
                Dim::Param(p) if !self.bind(p, size) => {
                    return Err(mismatch(format!(
                        "'{p}' is {} but this tensor has {size}",
                        self.get(p).unwrap_or(size)
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }
}

// ── Compiled state ─────────────────────────────────────────────

/// Hands out unit ids to the state creations of one compile call.
#[derive(Debug, Default)]
pub struct CompilePass {
    next: AtomicI64,
}

impl CompilePass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> i64 {
        self.next.load(Ordering::Relaxed)
    }
}

/// A compiled region: everything a compute call needs.
pub struct KernelState {
    name: String,
    subgraph: Arc<RegionSubgraph>,
    runtime_inputs: Vec<String>,
    input_shapes: Vec<Option<TensorShape>>,
    kernel: Box<dyn CompiledKernel>,
    allocator: Arc<MemoryPool>,
    allow_unaligned_buffers: bool,
}

/// Handle shared between a unit and its in-flight compute calls.
pub type FunctionState = Arc<KernelState>;

impl KernelState {
    fn build(
        subgraph: &Arc<RegionSubgraph>,
        shapes: &ShapeExprContext,
        id: i64,
        provider: &ProviderInner,
        ctx: &ComputeContext,
    ) -> Result<Self, ProviderError> {
        let name = format!("{}_{id}", subgraph.name());
        let start = Instant::now();

        let codegen = CodegenContext {
            target: provider.target,
            constants: &provider.constants,
            shapes,
            domain_versions: &provider.domains,
            allocator: ctx.allocator(),
            enable_per_node_parallel: provider.config.enable_per_node_parallel,
            unit_name: &name,
        };
        let kernel = provider.backend.lower(subgraph, &codegen)?;
        let runtime_inputs: Vec<String> = subgraph.runtime_inputs().map(str::to_string).collect();
        let input_shapes = runtime_inputs.iter().map(|input| shapes.get(input)).collect();

        tracing::info!(
            "compiled {name}: {} nodes with '{}' for {} in {:.2}ms",
            subgraph.num_nodes(),
            provider.backend.name(),
            provider.target,
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            name,
            subgraph: Arc::clone(subgraph),
            runtime_inputs,
            input_shapes,
            kernel,
            allocator: Arc::clone(ctx.allocator()),
            allow_unaligned_buffers: provider.config.allow_unaligned_buffers,
        })
    }

    /// `"{fused}_{id}"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subgraph(&self) -> &RegionSubgraph {
        &self.subgraph
    }

    /// Inputs a compute call must pass, in order.
    pub fn runtime_inputs(&self) -> &[String] {
        &self.runtime_inputs
    }

    /// Allocator the state was created with.
    pub fn allocator(&self) -> &Arc<MemoryPool> {
        &self.allocator
    }

    /// Runs the compiled region on `ctx.inputs()`.
    pub fn compute(&self, ctx: &mut KernelContext) -> Result<(), ProviderError> {
        let expected = &self.runtime_inputs;
        if ctx.inputs().len() != expected.len() {
            return Err(self.failure(format!(
                "expected {} inputs {:?}, got {}",
                expected.len(),
                expected,
                ctx.inputs().len()
            )));
        }

        let mut dims = RealizedDims::new();
        for ((name, tensor), declared) in expected.iter().zip(ctx.inputs()).zip(&self.input_shapes) {
            if !self.allow_unaligned_buffers && !is_aligned(tensor) {
                return Err(self.failure(format!("input '{name}' is not {}-aligned", tensor.dtype())));
            }
            if let Some(declared) = declared {
                dims.check(&self.name, name, declared, tensor.shape())?;
            }
        }

        self.kernel.run(ctx, &mut dims)?;

        if ctx.outputs().len() != self.subgraph.outputs().len() {
            return Err(self.failure(format!(
                "kernel produced {} outputs, expected {}",
                ctx.outputs().len(),
                self.subgraph.outputs().len()
            )));
        }
        Ok(())
    }

    fn failure(&self, detail: String) -> ProviderError {
        ProviderError::Execution {
            region: self.name.clone(),
            detail,
        }
    }
}

impl std::fmt::Debug for KernelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelState")
            .field("name", &self.name)
            .field("nodes", &self.subgraph.num_nodes())
            .finish()
    }
}

fn is_aligned(tensor: &Tensor) -> bool {
    let bytes = tensor.as_bytes();
    bytes.is_empty() || (bytes.as_ptr() as usize) % tensor.dtype().size_bytes() == 0
}

// ── Lazy units ─────────────────────────────────────────────────

enum UnitState {
    Uncompiled,
    Active(FunctionState),
    Released,
}

/// Observable lifecycle phase of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    Uncompiled,
    Active,
    Released,
}

/// A fused node that compiles on first use.
pub struct LazyUnit {
    subgraph: Arc<RegionSubgraph>,
    /// Shapes of the region's tensors, frozen when the unit was created.
    shapes: ShapeExprContext,
    provider: Arc<ProviderInner>,
    pass: Arc<CompilePass>,
    state: Mutex<UnitState>,
    compilations: AtomicUsize,
}

impl LazyUnit {
    pub(crate) fn new(
        subgraph: Arc<RegionSubgraph>,
        provider: Arc<ProviderInner>,
        pass: Arc<CompilePass>,
    ) -> Self {
        let shapes = provider.shapes.subset(subgraph.tensors());
        Self {
            subgraph,
            shapes,
            provider,
            pass,
            state: Mutex::new(UnitState::Uncompiled),
            compilations: AtomicUsize::new(0),
        }
    }

    /// Returns the unit's state, compiling it on the first call.
    ///
    /// The unit lock is held while lowering, so concurrent first callers
    /// wait and then share the result. A failed lowering leaves the unit
    /// uncompiled.
    pub fn create_state(&self, ctx: &ComputeContext) -> Result<FunctionState, ProviderError> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match &*state {
            UnitState::Active(s) => return Ok(Arc::clone(s)),
            UnitState::Released => {
                return Err(ProviderError::StateReleased {
                    unit: self.subgraph.name().to_string(),
                })
            }
            UnitState::Uncompiled => {}
        }

        let id = self.pass.next_id();
        let compiled = Arc::new(KernelState::build(&self.subgraph, &self.shapes, id, &self.provider, ctx)?);
        self.compilations.fetch_add(1, Ordering::Relaxed);
        *state = UnitState::Active(Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Drops the unit's reference to its state. Idempotent.
    pub fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !matches!(*state, UnitState::Released) {
            tracing::debug!("released {}", self.subgraph.name());
        }
        *state = UnitState::Released;
    }

    /// How many times the region was lowered.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> UnitStatus {
        match *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) {
            UnitState::Uncompiled => UnitStatus::Uncompiled,
            UnitState::Active(_) => UnitStatus::Active,
            UnitState::Released => UnitStatus::Released,
        }
    }

    pub fn name(&self) -> &str {
        self.subgraph.name()
    }

    pub fn subgraph(&self) -> &RegionSubgraph {
        &self.subgraph
    }
}

impl std::fmt::Debug for LazyUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyUnit")
            .field("name", &self.name())
            .field("status", &self.status())
            .field("compilations", &self.compilations())
            .finish()
    }
}

// ── Callback triple ────────────────────────────────────────────

pub type CreateStateFn =
    Box<dyn Fn(&ComputeContext) -> Result<FunctionState, ProviderError> + Send + Sync>;
pub type ComputeFn =
    Box<dyn Fn(&FunctionState, &mut KernelContext) -> Result<(), ProviderError> + Send + Sync>;
pub type ReleaseStateFn = Box<dyn Fn(Option<FunctionState>) + Send + Sync>;

/// The callbacks a host uses to drive one fused node.
pub struct NodeComputeInfo {
    pub create_state: CreateStateFn,
    pub compute: ComputeFn,
    pub release_state: ReleaseStateFn,
    unit: Arc<LazyUnit>,
}

impl NodeComputeInfo {
    pub(crate) fn new(unit: Arc<LazyUnit>) -> Self {
        let create_unit = Arc::clone(&unit);
        let release_unit = Arc::clone(&unit);
        Self {
            create_state: Box::new(move |ctx| create_unit.create_state(ctx)),
            compute: Box::new(|state, ctx| state.compute(ctx)),
            release_state: Box::new(move |state| {
                if state.is_some() {
                    release_unit.release();
                }
            }),
            unit,
        }
    }

    pub fn name(&self) -> &str {
        self.unit.name()
    }

    /// The unit behind the callbacks.
    pub fn unit(&self) -> &LazyUnit {
        &self.unit
    }
}

impl std::fmt::Debug for NodeComputeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeComputeInfo")
            .field("unit", &self.unit)
            .finish()
    }
}
