// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference backend that evaluates a region step by step with the
//! `tensor-core` kernels.
//!
//! Lowering resolves everything that is constant for the region. Operator
//! attributes are read from the node; constant inputs such as weights,
//! `Tile` repeats and `Slice` parameters come from the constant store, so a
//! lowered kernel never depends on the host keeping its initializers.
//! Running only moves tensors between steps.

use super::{CodegenBackend, CodegenContext, CompiledKernel, RegionSubgraph};
use crate::compile::{KernelContext, RealizedDims};
use crate::ProviderError;
use model_ir::{Attribute, Node};
use std::collections::HashMap;
use tensor_core::{
    BinaryOp, DType, ReduceKind, Tensor, TensorError, TensorShape, TensorView, UnaryOp,
};

const LAYER_NORM_EPSILON: f32 = 1e-5;

/// Backend that interprets regions instead of emitting machine code.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpreterBackend;

impl InterpreterBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CodegenBackend for InterpreterBackend {
    fn name(&self) -> &str {
        "interpreter"
    }

    fn lower(
        &self,
        subgraph: &RegionSubgraph,
        ctx: &CodegenContext<'_>,
    ) -> Result<Box<dyn CompiledKernel>, ProviderError> {
        let mut instrs = Vec::with_capacity(subgraph.num_nodes());
        for node in subgraph.nodes() {
            check_element_types(subgraph, node)?;
            let output = single_output(node)?;
            instrs.push(Instr {
                node: node.name.clone(),
                step: lower_node(node, ctx)?,
                output: output.to_string(),
                declared: ctx.shapes.get(output),
            });
        }

        if ctx.enable_per_node_parallel {
            tracing::debug!("{}: interpreter runs steps sequentially", ctx.unit_name);
        }
        tracing::debug!(
            "{}: lowered {} steps for target {} ({} lanes of f32)",
            ctx.unit_name,
            instrs.len(),
            ctx.target,
            ctx.target.natural_vector_width(32)
        );

        let mut constants = HashMap::new();
        for name in subgraph.constant_inputs() {
            let captured = ctx.constants.get(name).ok_or_else(|| ProviderError::InvalidInitializer {
                name: name.to_string(),
                detail: format!("not captured for {}", ctx.unit_name),
            })?;
            constants.insert(name.to_string(), captured.to_tensor()?);
        }

        Ok(Box::new(InterpretedKernel {
            name: ctx.unit_name.to_string(),
            runtime_inputs: subgraph.runtime_inputs().map(str::to_string).collect(),
            constants,
            outputs: subgraph.outputs().to_vec(),
            instrs,
        }))
    }
}

/// One lowered operator.
#[derive(Debug, Clone)]
enum Step {
    Unary { op: UnaryOp, input: String },
    Binary { op: BinaryOp, lhs: String, rhs: String },
    MatMul { lhs: String, rhs: String },
    Softmax { input: String, axis: i64, coerce_2d: bool },
    LayerNorm { input: String, scale: String, bias: Option<String>, axis: i64, epsilon: f32 },
    Reduce { kind: ReduceKind, input: String, axes: Vec<i64>, keepdims: bool },
    Tile { input: String, repeats: Vec<i64> },
    Slice {
        input: String,
        starts: Vec<i64>,
        ends: Vec<i64>,
        axes: Option<Vec<i64>>,
        steps: Option<Vec<i64>>,
    },
}

#[derive(Debug, Clone)]
struct Instr {
    node: String,
    step: Step,
    output: String,
    /// Inferred shape of `output`, checked after every run of the step.
    declared: Option<TensorShape>,
}

fn check_element_types(subgraph: &RegionSubgraph, node: &Node) -> Result<(), ProviderError> {
    // Index operands of Tile and Slice are consumed at lowering time.
    let data: Vec<&str> = match node.op_type.as_str() {
        "Tile" | "Slice" => node.input(0).into_iter().collect(),
        _ => node.present_inputs().collect(),
    };
    for tensor in data.into_iter().chain(node.outputs.iter().map(String::as_str)) {
        match subgraph.node_arg(tensor).and_then(|a| a.dtype) {
            None | Some(DType::F32) => {}
            Some(other) => {
                return Err(ProviderError::unimplemented(format!(
                    "{} on {other} tensor '{tensor}'",
                    node.op_type
                )));
            }
        }
    }
    Ok(())
}

fn single_output(node: &Node) -> Result<&str, ProviderError> {
    let mut present = node.outputs.iter().filter(|o| !o.is_empty());
    match (present.next(), present.next()) {
        (Some(out), None) if node.outputs.first() == Some(out) => Ok(out),
        _ => Err(ProviderError::unimplemented(format!(
            "{} '{}' with outputs {:?}",
            node.op_type, node.name, node.outputs
        ))),
    }
}

fn required_input(node: &Node, pos: usize) -> Result<String, ProviderError> {
    node.input(pos).map(str::to_string).ok_or_else(|| {
        ProviderError::unimplemented(format!("{} '{}' without input {pos}", node.op_type, node.name))
    })
}

fn int_attr(node: &Node, key: &str, default: i64) -> i64 {
    node.attribute(key).and_then(Attribute::as_int).unwrap_or(default)
}

/// Reads an integer list that must be a captured constant.
fn constant_ints(
    node: &Node,
    pos: usize,
    ctx: &CodegenContext<'_>,
) -> Result<Option<Vec<i64>>, ProviderError> {
    let Some(name) = node.input(pos) else {
        return Ok(None);
    };
    let tensor = ctx.constants.get(name).ok_or_else(|| {
        ProviderError::unimplemented(format!(
            "{} '{}' reads non-constant '{name}'",
            node.op_type, node.name
        ))
    })?;
    tensor.to_i64_vec().map(Some)
}

fn attr_ints(node: &Node, key: &str) -> Option<Vec<i64>> {
    node.attribute(key).and_then(Attribute::as_ints).map(<[i64]>::to_vec)
}

fn lower_node(node: &Node, ctx: &CodegenContext<'_>) -> Result<Step, ProviderError> {
    let input = |pos| required_input(node, pos);
    let step = match node.op_type.as_str() {
        "Relu" | "Sigmoid" | "Tanh" | "Identity" => Step::Unary {
            op: match node.op_type.as_str() {
                "Relu" => UnaryOp::Relu,
                "Sigmoid" => UnaryOp::Sigmoid,
                "Tanh" => UnaryOp::Tanh,
                _ => UnaryOp::Identity,
            },
            input: input(0)?,
        },
        "Add" | "Sub" | "Mul" | "Div" => Step::Binary {
            op: match node.op_type.as_str() {
                "Add" => BinaryOp::Add,
                "Sub" => BinaryOp::Sub,
                "Mul" => BinaryOp::Mul,
                _ => BinaryOp::Div,
            },
            lhs: input(0)?,
            rhs: input(1)?,
        },
        "MatMul" => Step::MatMul {
            lhs: input(0)?,
            rhs: input(1)?,
        },
        "Softmax" => {
            // Before opset 13 Softmax flattens to 2-D around `axis`.
            let legacy = node.since_version < 13;
            Step::Softmax {
                input: input(0)?,
                axis: int_attr(node, "axis", if legacy { 1 } else { -1 }),
                coerce_2d: legacy,
            }
        }
        "LayerNormalization" => Step::LayerNorm {
            input: input(0)?,
            scale: input(1)?,
            bias: node.input(2).map(str::to_string),
            axis: int_attr(node, "axis", -1),
            epsilon: node
                .attribute("epsilon")
                .and_then(Attribute::as_float)
                .unwrap_or(LAYER_NORM_EPSILON),
        },
        "ReduceSum" | "ReduceMean" | "ReduceMax" => Step::Reduce {
            kind: match node.op_type.as_str() {
                "ReduceSum" => ReduceKind::Sum,
                "ReduceMean" => ReduceKind::Mean,
                _ => ReduceKind::Max,
            },
            input: input(0)?,
            axes: attr_ints(node, "axes").unwrap_or_default(),
            keepdims: int_attr(node, "keepdims", 1) != 0,
        },
        "Tile" => Step::Tile {
            input: input(0)?,
            repeats: constant_ints(node, 1, ctx)?.ok_or_else(|| {
                ProviderError::unimplemented(format!("Tile '{}' without repeats", node.name))
            })?,
        },
        "Slice" if node.inputs.len() > 1 => {
            let missing = |what: &str| {
                ProviderError::unimplemented(format!("Slice '{}' without {what}", node.name))
            };
            Step::Slice {
                input: input(0)?,
                starts: constant_ints(node, 1, ctx)?.ok_or_else(|| missing("starts"))?,
                ends: constant_ints(node, 2, ctx)?.ok_or_else(|| missing("ends"))?,
                axes: constant_ints(node, 3, ctx)?,
                steps: constant_ints(node, 4, ctx)?,
            }
        }
        "Slice" => Step::Slice {
            input: input(0)?,
            starts: attr_ints(node, "starts").unwrap_or_default(),
            ends: attr_ints(node, "ends").unwrap_or_default(),
            axes: attr_ints(node, "axes"),
            steps: None,
        },
        other => {
            return Err(ProviderError::unimplemented(format!(
                "operator {other} in the interpreter backend"
            )))
        }
    };
    Ok(step)
}

struct InterpretedKernel {
    name: String,
    runtime_inputs: Vec<String>,
    constants: HashMap<String, Tensor>,
    outputs: Vec<String>,
    instrs: Vec<Instr>,
}

/// Tensors live during one run: borrowed boundary inputs and constants
/// plus owned intermediates.
struct Env<'a> {
    inputs: HashMap<&'a str, &'a Tensor>,
    values: HashMap<&'a str, Tensor>,
}

impl<'a> Env<'a> {
    fn get(&self, name: &str) -> Option<&Tensor> {
        self.values.get(name).or_else(|| self.inputs.get(name).copied())
    }
}

impl InterpretedKernel {
    fn failure(&self, node: &str, detail: impl std::fmt::Display) -> ProviderError {
        ProviderError::Execution {
            region: self.name.clone(),
            detail: format!("{node}: {detail}"),
        }
    }

    fn operand<'e>(&self, env: &'e Env<'_>, node: &str, name: &str) -> Result<&'e Tensor, ProviderError> {
        env.get(name)
            .ok_or_else(|| self.failure(node, format!("tensor '{name}' is not available")))
    }

    fn eval(&self, instr: &Instr, env: &Env<'_>) -> Result<Tensor, ProviderError> {
        let get = |name: &str| self.operand(env, &instr.node, name);
        let result: Result<Tensor, TensorError> = match &instr.step {
            Step::Unary { op, input } => {
                let x = get(input)?;
                let mut out = Tensor::zeros(x.shape().clone(), DType::F32);
                tensor_core::unary(*op, &x.view(), &mut out).map(|()| out)
            }
            Step::Binary { op, lhs, rhs } => {
                tensor_core::binary(*op, &get(lhs)?.view(), &get(rhs)?.view())
            }
            Step::MatMul { lhs, rhs } => tensor_core::matmul(&get(lhs)?.view(), &get(rhs)?.view()),
            Step::Softmax { input, axis, coerce_2d } => {
                let x = get(input)?;
                let mut out = Tensor::zeros(x.shape().clone(), DType::F32);
                tensor_core::softmax(&x.view(), *axis, *coerce_2d, &mut out).map(|()| out)
            }
            Step::LayerNorm { input, scale, bias, axis, epsilon } => {
                let x = get(input)?;
                let bias_view: Option<TensorView<'_>> = match bias {
                    Some(b) => Some(get(b)?.view()),
                    None => None,
                };
                let mut out = Tensor::zeros(x.shape().clone(), DType::F32);
                tensor_core::layer_norm(
                    &x.view(),
                    &get(scale)?.view(),
                    bias_view.as_ref(),
                    *axis,
                    *epsilon,
                    &mut out,
                )
                .map(|()| out)
            }
            Step::Reduce { kind, input, axes, keepdims } => {
                tensor_core::reduce(*kind, &get(input)?.view(), axes, *keepdims)
            }
            Step::Tile { input, repeats } => tensor_core::tile(&get(input)?.view(), repeats),
            Step::Slice { input, starts, ends, axes, steps } => tensor_core::slice(
                &get(input)?.view(),
                starts,
                ends,
                axes.as_deref(),
                steps.as_deref(),
            ),
        };
        result.map_err(|e| self.failure(&instr.node, e))
    }
}

impl CompiledKernel for InterpretedKernel {
    fn run(&self, ctx: &mut KernelContext, dims: &mut RealizedDims) -> Result<(), ProviderError> {
        let outputs = {
            let mut env = Env {
                inputs: self
                    .runtime_inputs
                    .iter()
                    .map(String::as_str)
                    .zip(ctx.inputs())
                    .chain(self.constants.iter().map(|(n, t)| (n.as_str(), t)))
                    .collect(),
                values: HashMap::new(),
            };

            for instr in &self.instrs {
                let value = self.eval(instr, &env)?;
                if let Some(declared) = &instr.declared {
                    dims.check(&self.name, &instr.output, declared, value.shape())?;
                }
                env.values.insert(instr.output.as_str(), value);
            }

            let mut outputs = Vec::with_capacity(self.outputs.len());
            for name in &self.outputs {
                let value = match env.values.remove(name.as_str()) {
                    Some(v) => v,
                    None => self.operand(&env, "outputs", name)?.clone(),
                };
                outputs.push(value);
            }
            outputs
        };
        ctx.set_outputs(outputs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConstantInitializerStore, DomainVersionRegistry, ShapeExprContext};
    use memory_manager::{MemoryBudget, MemoryPool};
    use model_ir::{Graph, NodeArg, TensorProto, Validated};
    use partition_planner::RegionBuilder;
    use std::sync::Arc;
    use tensor_core::Shape;

    struct Harness {
        constants: ConstantInitializerStore,
        shapes: ShapeExprContext,
        domains: DomainVersionRegistry,
        allocator: Arc<MemoryPool>,
    }

    impl Harness {
        fn new(graph: &Graph<Validated>) -> Self {
            let allocator = Arc::new(MemoryPool::new(MemoryBudget::from_mb(16)));
            let constants = ConstantInitializerStore::new(Arc::clone(&allocator));
            for init in graph.initializers() {
                constants.capture(&init.name, init).unwrap();
            }
            let shapes = ShapeExprContext::new();
            for arg in graph.node_args() {
                if let Some(s) = &arg.shape {
                    shapes.insert(arg.name.clone(), s.clone());
                }
            }
            Self {
                constants,
                shapes,
                domains: DomainVersionRegistry::new(),
                allocator,
            }
        }

        fn lower(&self, graph: &Graph<Validated>) -> Result<Box<dyn CompiledKernel>, ProviderError> {
            let mut builder = RegionBuilder::new("Test");
            builder.add_region((0..graph.num_nodes()).collect());
            let region = builder.build(graph).unwrap().remove(0);
            let subgraph = RegionSubgraph::from_region(graph, &region);
            let ctx = CodegenContext {
                target: crate::CodegenTarget::StackVm,
                constants: &self.constants,
                shapes: &self.shapes,
                domain_versions: &self.domains,
                allocator: &self.allocator,
                enable_per_node_parallel: false,
                unit_name: "Test_0_0",
            };
            InterpreterBackend::new().lower(&subgraph, &ctx)
        }
    }

    fn run(kernel: &dyn CompiledKernel, inputs: Vec<Tensor>) -> Result<Vec<Tensor>, ProviderError> {
        let mut ctx = KernelContext::new(inputs);
        let mut dims = RealizedDims::new();
        kernel.run(&mut ctx, &mut dims)?;
        Ok(ctx.into_outputs())
    }

    fn f32_arg(name: &str, dims: Vec<tensor_core::Dim>) -> NodeArg {
        NodeArg::new(name, Some(TensorShape::new(dims)), Some(DType::F32))
    }

    #[test]
    fn test_relu_add_chain() {
        let mut g = Graph::new("g").with_opset("", 13);
        g.add_input(f32_arg("x", vec!["n".into(), 2.into()]));
        g.add_initializer(TensorProto::from_f32("b", vec![2], vec![1.0, 2.0]));
        g.add_output(f32_arg("y", vec!["n".into(), 2.into()]));
        g.add_node(Node::new(0, "relu", "Relu").with_inputs(["x"]).with_outputs(["t"]));
        g.add_node(Node::new(1, "add", "Add").with_inputs(["t", "b"]).with_outputs(["y"]));
        let g = g.validate().unwrap();

        let h = Harness::new(&g);
        let kernel = h.lower(&g).unwrap();
        let x = Tensor::from_f32(Shape::matrix(2, 2), &[-1.0, 2.0, 3.0, -4.0]).unwrap();
        let out = run(kernel.as_ref(), vec![x]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to_f32_vec().unwrap(), vec![1.0, 4.0, 4.0, 2.0]);
    }

    #[test]
    fn test_constant_weights_come_from_the_store() {
        let mut g = Graph::new("g").with_opset("", 13);
        g.add_input(f32_arg("x", vec![1.into(), 2.into()]));
        g.add_initializer(TensorProto::from_f32("w", vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]));
        g.add_output(f32_arg("y", vec![1.into(), 2.into()]));
        g.add_node(Node::new(0, "mm", "MatMul").with_inputs(["x", "w"]).with_outputs(["y"]));
        let g = g.validate().unwrap();

        let h = Harness::new(&g);
        let kernel = h.lower(&g).unwrap();
        let x = Tensor::from_f32(Shape::matrix(1, 2), &[1.0, 1.0]).unwrap();
        let out = run(kernel.as_ref(), vec![x]).unwrap();
        assert_eq!(out[0].to_f32_vec().unwrap(), vec![4.0, 6.0]);
    }

    #[test]
    fn test_uncaptured_constant_fails_lowering() {
        let mut g = Graph::new("g").with_opset("", 13);
        g.add_input(f32_arg("x", vec![2.into()]));
        g.add_initializer(TensorProto::from_f32("b", vec![2], vec![1.0, 2.0]));
        g.add_output(f32_arg("y", vec![2.into()]));
        g.add_node(Node::new(0, "add", "Add").with_inputs(["x", "b"]).with_outputs(["y"]));
        let g = g.validate().unwrap();

        let mut h = Harness::new(&g);
        h.constants = ConstantInitializerStore::new(Arc::clone(&h.allocator));
        assert!(matches!(
            h.lower(&g),
            Err(ProviderError::InvalidInitializer { .. })
        ));
    }

    #[test]
    fn test_tile_reads_constant_repeats() {
        let mut g = Graph::new("g").with_opset("", 13);
        g.add_input(f32_arg("x", vec![2.into()]));
        g.add_initializer(TensorProto::from_i64("r", vec![1], vec![3]));
        g.add_output(f32_arg("y", vec![6.into()]));
        g.add_node(Node::new(0, "tile", "Tile").with_inputs(["x", "r"]).with_outputs(["y"]));
        let g = g.validate().unwrap();

        let h = Harness::new(&g);
        let kernel = h.lower(&g).unwrap();
        let x = Tensor::from_f32(Shape::vector(2), &[1.0, 2.0]).unwrap();
        let out = run(kernel.as_ref(), vec![x]).unwrap();
        assert_eq!(out[0].to_f32_vec().unwrap(), vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn test_slice_tensor_form() {
        let mut g = Graph::new("g").with_opset("", 13);
        g.add_input(f32_arg("x", vec![4.into()]));
        g.add_initializer(TensorProto::from_i64("s", vec![1], vec![1]));
        g.add_initializer(TensorProto::from_i64("e", vec![1], vec![3]));
        g.add_output(f32_arg("y", vec![2.into()]));
        g.add_node(
            Node::new(0, "slice", "Slice")
                .with_inputs(["x", "s", "e"])
                .with_outputs(["y"]),
        );
        let g = g.validate().unwrap();

        let h = Harness::new(&g);
        let kernel = h.lower(&g).unwrap();
        let x = Tensor::from_f32(Shape::vector(4), &[0.0, 1.0, 2.0, 3.0]).unwrap();
        let out = run(kernel.as_ref(), vec![x]).unwrap();
        assert_eq!(out[0].to_f32_vec().unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_legacy_softmax_defaults() {
        let mut g = Graph::new("g").with_opset("", 11);
        g.add_input(f32_arg("x", vec![1.into(), 2.into()]));
        g.add_output(f32_arg("y", vec![1.into(), 2.into()]));
        g.add_node(Node::new(0, "sm", "Softmax").with_inputs(["x"]).with_outputs(["y"]));
        let g = g.validate().unwrap();

        let h = Harness::new(&g);
        let kernel = h.lower(&g).unwrap();
        let x = Tensor::from_f32(Shape::matrix(1, 2), &[0.0, 0.0]).unwrap();
        let out = run(kernel.as_ref(), vec![x]).unwrap();
        assert_eq!(out[0].to_f32_vec().unwrap(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_non_f32_is_unimplemented() {
        let mut g = Graph::new("g").with_opset("", 13);
        g.add_input(NodeArg::new("x", Some(TensorShape::from_concrete(&[2])), Some(DType::I64)));
        g.add_output(NodeArg::new("y", None, Some(DType::I64)));
        g.add_node(Node::new(0, "id", "Identity").with_inputs(["x"]).with_outputs(["y"]));
        let g = g.validate().unwrap();

        let h = Harness::new(&g);
        assert!(matches!(h.lower(&g), Err(ProviderError::Unimplemented { .. })));
    }

    #[test]
    fn test_unknown_op_is_unimplemented() {
        let mut g = Graph::new("g").with_opset("", 13);
        g.add_input(f32_arg("x", vec![2.into()]));
        g.add_output(f32_arg("y", vec![2.into()]));
        g.add_node(Node::new(0, "c", "Conv").with_inputs(["x"]).with_outputs(["y"]));
        let g = g.validate().unwrap();

        let h = Harness::new(&g);
        assert!(matches!(h.lower(&g), Err(ProviderError::Unimplemented { .. })));
    }

    #[test]
    fn test_symbolic_dim_mismatch_is_execution_error() {
        let mut g = Graph::new("g").with_opset("", 13);
        g.add_input(f32_arg("x", vec!["n".into()]));
        g.add_input(f32_arg("z", vec!["n".into()]));
        g.add_output(f32_arg("y", vec!["n".into()]));
        g.add_node(Node::new(0, "add", "Add").with_inputs(["x", "z"]).with_outputs(["y"]));
        let g = g.validate().unwrap();

        let h = Harness::new(&g);
        let kernel = h.lower(&g).unwrap();
        let x = Tensor::from_f32(Shape::vector(3), &[1.0; 3]).unwrap();
        let z = Tensor::from_f32(Shape::vector(3), &[1.0; 3]).unwrap();

        let mut ctx = KernelContext::new(vec![x, z]);
        let mut dims = RealizedDims::new();
        assert!(dims.bind("n", 4));
        let err = kernel.run(&mut ctx, &mut dims).unwrap_err();
        assert!(matches!(err, ProviderError::Execution { .. }));
    }
}
