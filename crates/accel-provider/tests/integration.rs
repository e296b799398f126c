// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: claim → compile → create_state → compute → release.
//!
//! These tests drive the provider only through its public surface, the
//! way a host session would.

use accel_provider::{
    AccelProvider, CodegenBackend, CodegenContext, CompiledKernel, DeclaredShapeInference,
    FusedNode, InterpreterBackend, KernelContext, NodeComputeInfo, ProviderConfig,
    ProviderError, RegionSubgraph, ShapeExprContext, ShapeInference, UnitStatus,
};
use model_ir::{Graph, Node, NodeArg, TensorProto, Validated};
use tensor_core::{DType, Dim, Shape, Tensor, TensorShape};

// ── Helpers ────────────────────────────────────────────────────

fn config() -> ProviderConfig {
    ProviderConfig {
        target: "stackvm".into(),
        memory_limit: "32M".into(),
        ..Default::default()
    }
}

fn provider() -> AccelProvider {
    AccelProvider::new(config()).unwrap()
}

fn f32_arg(name: &str, dims: Vec<Dim>) -> NodeArg {
    NodeArg::new(name, Some(TensorShape::new(dims)), Some(DType::F32))
}

fn f32_tensor(dims: &[usize], values: &[f32]) -> Tensor {
    Tensor::from_f32(Shape::new(dims.to_vec()), values).unwrap()
}

/// `y = relu(x @ w + b)` with a symbolic batch dimension.
fn mlp_graph() -> Graph<Validated> {
    let mut g = Graph::new("mlp").with_opset("", 13);
    g.add_input(f32_arg("x", vec!["batch".into(), 2.into()]));
    g.add_initializer(TensorProto::from_f32("w", vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]));
    g.add_initializer(TensorProto::from_f32("b", vec![2], vec![-10.0, 0.5]));
    g.add_value_info(f32_arg("h", vec!["batch".into(), 2.into()]));
    g.add_output(f32_arg("y", vec!["batch".into(), 2.into()]));
    g.add_node(Node::new(0, "mm", "MatMul").with_inputs(["x", "w"]).with_outputs(["h"]));
    g.add_node(Node::new(1, "add", "Add").with_inputs(["h", "b"]).with_outputs(["z"]));
    g.add_node(Node::new(2, "act", "Relu").with_inputs(["z"]).with_outputs(["y"]));
    g.validate().unwrap()
}

/// Runtime input of the single MLP region. `w` and `b` are captured.
fn mlp_inputs(batch: usize) -> Vec<Tensor> {
    let x: Vec<f32> = (0..batch * 2).map(|i| i as f32).collect();
    vec![f32_tensor(&[batch, 2], &x)]
}

/// `y = x @ w` with a concrete `[1, 2]` input.
fn matmul_graph(name: &str, w: Vec<f32>) -> Graph<Validated> {
    let mut g = Graph::new(name).with_opset("", 13);
    g.add_input(f32_arg("x", vec![1.into(), 2.into()]));
    g.add_initializer(TensorProto::from_f32("w", vec![2, 2], w));
    g.add_output(f32_arg("y", vec![1.into(), 2.into()]));
    g.add_node(Node::new(0, "mm", "MatMul").with_inputs(["x", "w"]).with_outputs(["y"]));
    g.validate().unwrap()
}

fn compile_single(provider: &AccelProvider, graph: &Graph<Validated>) -> NodeComputeInfo {
    let mut infos = provider.claim_and_compile(graph).unwrap();
    assert_eq!(infos.len(), 1);
    infos.remove(0)
}

fn run(info: &NodeComputeInfo, provider: &AccelProvider, inputs: Vec<Tensor>) -> Result<Vec<Tensor>, ProviderError> {
    let state = (info.create_state)(&provider.compute_context())?;
    let mut ctx = KernelContext::new(inputs);
    (info.compute)(&state, &mut ctx)?;
    Ok(ctx.into_outputs())
}

struct FailingInference;

impl ShapeInference for FailingInference {
    fn infer(&self, _: &Graph<Validated>, _: &ShapeExprContext) -> Result<(), ProviderError> {
        Err(ProviderError::ShapeInferenceFailed("unsupported operator".into()))
    }
}

struct RejectingBackend;

impl CodegenBackend for RejectingBackend {
    fn name(&self) -> &str {
        "rejecting"
    }

    fn lower(
        &self,
        _: &RegionSubgraph,
        _: &CodegenContext<'_>,
    ) -> Result<Box<dyn CompiledKernel>, ProviderError> {
        Err(ProviderError::Unimplemented {
            what: "everything".into(),
        })
    }
}

// ── Capability ─────────────────────────────────────────────────

#[test]
fn test_shape_inference_failure_declines_graph() {
    let p = AccelProvider::with_components(
        config(),
        Box::new(FailingInference),
        Box::new(InterpreterBackend::new()),
    )
    .unwrap();
    assert!(p.get_capability(&mlp_graph()).unwrap().is_empty());
    assert!(p.constants().is_empty());
}

#[test]
fn test_bad_dims_are_not_claimed() {
    for bad in [Dim::Value(0), Dim::Value(-1), Dim::Unknown] {
        let mut g = Graph::new("g").with_opset("", 13);
        g.add_input(f32_arg("x", vec![bad, 4.into()]));
        g.add_output(NodeArg::new("y", None, None));
        g.add_node(Node::new(0, "r", "Relu").with_inputs(["x"]).with_outputs(["y"]));
        let g = g.validate().unwrap();
        assert!(provider().get_capability(&g).unwrap().is_empty());
    }
}

#[test]
fn test_mlp_is_one_region() {
    let p = provider();
    let g = mlp_graph();
    let caps = p.get_capability(&g).unwrap();
    assert_eq!(caps.len(), 1);
    assert_eq!(caps[0].node_indices, vec![0, 1, 2]);
    assert_eq!(caps[0].meta_def.name, "AccelExecutionProvider_0");
    assert_eq!(caps[0].meta_def.domain, "com.accel");
    assert_eq!(caps[0].meta_def.inputs, vec!["x", "w", "b"]);
    assert_eq!(caps[0].meta_def.outputs, vec!["y"]);

    let json = serde_json::to_value(&caps[0]).unwrap();
    assert_eq!(json["meta_def"]["name"], "AccelExecutionProvider_0");
    assert_eq!(json["node_indices"], serde_json::json!([0, 1, 2]));

    assert_eq!(p.constants().names(), vec!["b", "w"]);
    assert_eq!(p.constants().get("w").unwrap().to_f32_vec().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_dynamic_tile_splits_chain() {
    // [A, B(Tile with runtime repeats), C] → {A}, {C}
    let mut g = Graph::new("chain").with_opset("", 13);
    g.add_input(f32_arg("x", vec![4.into()]));
    g.add_input(NodeArg::new("r", Some(TensorShape::from_concrete(&[1])), Some(DType::I64)));
    g.add_value_info(f32_arg("t", vec![8.into()]));
    g.add_output(NodeArg::new("y", None, None));
    g.add_node(Node::new(0, "a", "Relu").with_inputs(["x"]).with_outputs(["a_out"]));
    g.add_node(Node::new(1, "b", "Tile").with_inputs(["a_out", "r"]).with_outputs(["t"]));
    g.add_node(Node::new(2, "c", "Sigmoid").with_inputs(["t"]).with_outputs(["y"]));
    let g = g.validate().unwrap();

    let caps = provider().get_capability(&g).unwrap();
    let claimed: Vec<Vec<usize>> = caps.iter().map(|c| c.node_indices.clone()).collect();
    assert_eq!(claimed, vec![vec![0], vec![2]]);
    assert_eq!(caps[0].meta_def.outputs, vec!["a_out"]);
    assert_eq!(caps[1].meta_def.inputs, vec!["t"]);
}

#[test]
fn test_regions_are_disjoint_subsets_of_eligible_nodes() {
    // relu → conv(unsupported) → relu, plus an independent sigmoid branch.
    let mut g = Graph::new("mixed").with_opset("", 13);
    g.add_input(f32_arg("x", vec![2.into(), 2.into()]));
    g.add_value_info(f32_arg("c", vec![2.into(), 2.into()]));
    g.add_output(NodeArg::new("y", None, None));
    g.add_output(NodeArg::new("s", None, None));
    g.add_node(Node::new(0, "r0", "Relu").with_inputs(["x"]).with_outputs(["a"]));
    g.add_node(Node::new(1, "conv", "Conv").with_inputs(["a"]).with_outputs(["c"]));
    g.add_node(Node::new(2, "r1", "Relu").with_inputs(["c"]).with_outputs(["y"]));
    g.add_node(Node::new(3, "sg", "Sigmoid").with_inputs(["x"]).with_outputs(["s"]));
    let g = g.validate().unwrap();

    let caps = provider().get_capability(&g).unwrap();
    let mut seen = std::collections::HashSet::new();
    for cap in &caps {
        for &n in &cap.node_indices {
            assert!(seen.insert(n), "node {n} claimed twice");
            assert_ne!(n, 1, "unsupported node claimed");
        }
    }
    assert_eq!(seen.len(), 3);
}

#[test]
fn test_domain_versions_are_fixed_per_instance() {
    let p = provider();
    let g = mlp_graph();
    p.get_capability(&g).unwrap();
    p.get_capability(&g).unwrap();

    let mut other = Graph::new("other").with_opset("", 17);
    other.add_input(f32_arg("x", vec![2.into()]));
    other.add_output(NodeArg::new("y", None, None));
    other.add_node(Node::new(0, "r", "Relu").with_inputs(["x"]).with_outputs(["y"]));
    let other = other.validate().unwrap();

    let err = p.get_capability(&other).unwrap_err();
    assert!(matches!(
        err,
        ProviderError::InconsistentDomainVersion {
            recorded: 13,
            observed: 17,
            ..
        }
    ));

    // A fresh instance accepts it.
    assert_eq!(provider().get_capability(&other).unwrap().len(), 1);
}

#[test]
fn test_capture_is_idempotent() {
    let p = provider();
    let g = mlp_graph();
    p.get_capability(&g).unwrap();
    let bytes = p.constants().total_bytes();
    let used = p.allocator().allocated_bytes();

    p.get_capability(&g).unwrap();
    assert_eq!(p.constants().len(), 2);
    assert_eq!(p.constants().total_bytes(), bytes);
    assert_eq!(p.allocator().allocated_bytes(), used);
}

#[test]
fn test_w0_raw_and_typed_capture_identically() {
    let graph_with = |w0: TensorProto| {
        let mut g = Graph::new("w0").with_opset("", 13);
        g.add_input(f32_arg("x", vec![2.into(), 2.into()]));
        g.add_initializer(w0);
        g.add_output(NodeArg::new("y", None, None));
        g.add_node(Node::new(0, "add", "Add").with_inputs(["x", "W0"]).with_outputs(["y"]));
        g.validate().unwrap()
    };

    let typed = TensorProto::from_f32("W0", vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]);
    let raw_bytes: Vec<u8> = [1.0f32, 2.0, 3.0, 4.0]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    let raw = TensorProto::from_raw("W0", vec![2, 2], DType::F32, raw_bytes);

    let a = provider();
    a.get_capability(&graph_with(typed)).unwrap();
    let b = provider();
    b.get_capability(&graph_with(raw)).unwrap();

    let wa = a.constants().get("W0").unwrap();
    let wb = b.constants().get("W0").unwrap();
    assert_eq!(wa.as_bytes(), wb.as_bytes());
    assert_eq!(wa.to_f32_vec().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(wa.dims(), &[2, 2]);
}

// ── Lifecycle ──────────────────────────────────────────────────

#[test]
fn test_end_to_end_mlp() {
    let p = provider();
    let info = compile_single(&p, &mlp_graph());
    assert_eq!(info.unit().status(), UnitStatus::Uncompiled);

    // x = [[0, 1], [2, 3]]; x @ w = [[3, 4], [11, 16]]; + b; relu.
    let out = run(&info, &p, mlp_inputs(2)).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].shape(), &Shape::matrix(2, 2));
    assert_eq!(out[0].to_f32_vec().unwrap(), vec![0.0, 4.5, 1.0, 16.5]);

    // A different batch size reuses the same compiled state.
    let out = run(&info, &p, mlp_inputs(3)).unwrap();
    assert_eq!(out[0].shape(), &Shape::matrix(3, 2));
    assert_eq!(info.unit().compilations(), 1);
}

#[test]
fn test_sequential_computes_compile_once() {
    let p = provider();
    let info = compile_single(&p, &mlp_graph());
    for _ in 0..5 {
        run(&info, &p, mlp_inputs(1)).unwrap();
    }
    assert_eq!(info.unit().compilations(), 1);
    assert_eq!(info.unit().status(), UnitStatus::Active);
}

#[test]
fn test_concurrent_computes_compile_once() {
    let p = provider();
    let info = compile_single(&p, &mlp_graph());
    let ctx = p.compute_context();

    let outputs: Vec<Vec<f32>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    let state = (info.create_state)(&ctx).unwrap();
                    let mut k = KernelContext::new(mlp_inputs(2));
                    (info.compute)(&state, &mut k).unwrap();
                    k.into_outputs()[0].to_f32_vec().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(info.unit().compilations(), 1);
    assert!(outputs.iter().all(|o| o == &outputs[0]));
}

#[test]
fn test_repeated_create_state_shares_state() {
    let p = provider();
    let info = compile_single(&p, &mlp_graph());
    let ctx = p.compute_context();
    let a = (info.create_state)(&ctx).unwrap();
    let b = (info.create_state)(&ctx).unwrap();
    assert!(std::sync::Arc::ptr_eq(&a, &b));
    assert_eq!(a.name(), "AccelExecutionProvider_0_0");
}

#[test]
fn test_unit_ids_follow_creation_order() {
    let mut g = Graph::new("two").with_opset("", 13);
    g.add_input(f32_arg("x", vec![4.into()]));
    g.add_value_info(f32_arg("c", vec![4.into()]));
    g.add_output(NodeArg::new("y", None, None));
    g.add_node(Node::new(0, "a", "Relu").with_inputs(["x"]).with_outputs(["a_out"]));
    g.add_node(Node::new(1, "conv", "Conv").with_inputs(["a_out"]).with_outputs(["c"]));
    g.add_node(Node::new(2, "b", "Tanh").with_inputs(["c"]).with_outputs(["y"]));
    let g = g.validate().unwrap();

    let p = provider();
    let infos = p.claim_and_compile(&g).unwrap();
    assert_eq!(infos.len(), 2);
    let ctx = p.compute_context();
    let second = (infos[1].create_state)(&ctx).unwrap();
    let first = (infos[0].create_state)(&ctx).unwrap();
    assert_eq!(second.name(), "AccelExecutionProvider_1_0");
    assert_eq!(first.name(), "AccelExecutionProvider_0_1");

    // A new compile call starts counting again.
    let again = p.claim_and_compile(&g).unwrap();
    let state = (again[0].create_state)(&ctx).unwrap();
    assert_eq!(state.name(), "AccelExecutionProvider_0_0");
}

#[test]
fn test_release_semantics() {
    let p = provider();
    let info = compile_single(&p, &mlp_graph());
    let ctx = p.compute_context();

    (info.release_state)(None);
    assert_eq!(info.unit().status(), UnitStatus::Uncompiled);

    let state = (info.create_state)(&ctx).unwrap();
    (info.release_state)(Some(std::sync::Arc::clone(&state)));
    assert_eq!(info.unit().status(), UnitStatus::Released);
    (info.release_state)(Some(std::sync::Arc::clone(&state)));
    assert_eq!(info.unit().status(), UnitStatus::Released);

    assert!(matches!(
        (info.create_state)(&ctx),
        Err(ProviderError::StateReleased { .. })
    ));

    // A handle obtained before release keeps working.
    let mut k = KernelContext::new(mlp_inputs(1));
    (info.compute)(&state, &mut k).unwrap();
    assert_eq!(k.outputs().len(), 1);
}

#[test]
fn test_per_call_failure_keeps_state_usable() {
    let p = provider();
    let info = compile_single(&p, &mlp_graph());
    let state = (info.create_state)(&p.compute_context()).unwrap();

    let mut missing = KernelContext::new(Vec::new());
    assert!(matches!(
        (info.compute)(&state, &mut missing),
        Err(ProviderError::Execution { .. })
    ));

    let mut wrong_width = KernelContext::new(vec![f32_tensor(&[1, 3], &[0.0; 3])]);
    assert!((info.compute)(&state, &mut wrong_width).is_err());

    let mut good = KernelContext::new(mlp_inputs(2));
    (info.compute)(&state, &mut good).unwrap();
    assert_eq!(info.unit().status(), UnitStatus::Active);
    assert_eq!(info.unit().compilations(), 1);
}

#[test]
fn test_lowering_failure_leaves_unit_uncompiled() {
    let p = AccelProvider::with_components(
        config(),
        Box::new(DeclaredShapeInference::new()),
        Box::new(RejectingBackend),
    )
    .unwrap();
    let info = compile_single(&p, &mlp_graph());
    let ctx = p.compute_context();

    assert!(matches!(
        (info.create_state)(&ctx),
        Err(ProviderError::Unimplemented { .. })
    ));
    assert_eq!(info.unit().status(), UnitStatus::Uncompiled);
    assert_eq!(info.unit().compilations(), 0);
}

#[test]
fn test_fused_node_from_capability() {
    let g = mlp_graph();
    let caps = provider().get_capability(&g).unwrap();
    let fused = FusedNode::from_capability(&g, &caps[0]);
    assert_eq!(fused.name(), "AccelExecutionProvider_0");
    let ops: Vec<&str> = fused.subgraph().nodes().iter().map(|n| n.op_type.as_str()).collect();
    assert_eq!(ops, vec!["MatMul", "Add", "Relu"]);
    assert_eq!(fused.subgraph().outputs(), &["y".to_string()]);
    let runtime: Vec<&str> = fused.subgraph().runtime_inputs().collect();
    assert_eq!(runtime, vec!["x"]);
    let constants: Vec<&str> = fused.subgraph().constant_inputs().collect();
    assert_eq!(constants, vec!["w", "b"]);
}

#[test]
fn test_compute_uses_captured_constants() {
    let p = provider();
    let info = compile_single(&p, &matmul_graph("mm", vec![1.0, 2.0, 3.0, 4.0]));
    assert_eq!(p.constants().get("w").unwrap().to_f32_vec().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);

    let state = (info.create_state)(&p.compute_context()).unwrap();
    assert_eq!(state.runtime_inputs(), &["x".to_string()]);

    let out = run(&info, &p, vec![f32_tensor(&[1, 2], &[1.0, 1.0])]).unwrap();
    assert_eq!(out[0].to_f32_vec().unwrap(), vec![4.0, 6.0]);

    // The host cannot override a captured weight.
    let mut with_weight = KernelContext::new(vec![
        f32_tensor(&[1, 2], &[1.0, 1.0]),
        f32_tensor(&[2, 2], &[0.0; 4]),
    ]);
    assert!(matches!(
        (info.compute)(&state, &mut with_weight),
        Err(ProviderError::Execution { .. })
    ));
}

#[test]
fn test_units_keep_shapes_of_their_graph() {
    let other = || {
        let mut g = Graph::new("other").with_opset("", 13);
        g.add_input(f32_arg("p", vec![5.into()]));
        g.add_output(f32_arg("q", vec![5.into()]));
        g.add_node(Node::new(0, "r", "Relu").with_inputs(["p"]).with_outputs(["q"]));
        g.validate().unwrap()
    };
    let g = matmul_graph("first", vec![1.0, 2.0, 3.0, 4.0]);
    let wrong_batch = || vec![f32_tensor(&[3, 2], &[0.0; 6])];

    // Compiled before another graph is claimed.
    let p = provider();
    let info = compile_single(&p, &g);
    p.get_capability(&other()).unwrap();
    assert!(matches!(
        run(&info, &p, wrong_batch()),
        Err(ProviderError::Execution { .. })
    ));

    // Claimed, then another graph is claimed, then compiled.
    let p = provider();
    let caps = p.get_capability(&g).unwrap();
    p.get_capability(&other()).unwrap();
    assert_eq!(p.shapes().get("x"), Some(TensorShape::from_concrete(&[1, 2])));
    assert!(p.shapes().get("p").is_some());

    let fused: Vec<FusedNode> = caps.iter().map(|c| FusedNode::from_capability(&g, c)).collect();
    let info = p.compile(&fused).unwrap().remove(0);
    assert!(matches!(
        run(&info, &p, wrong_batch()),
        Err(ProviderError::Execution { .. })
    ));
    let out = run(&info, &p, vec![f32_tensor(&[1, 2], &[1.0, 1.0])]).unwrap();
    assert_eq!(out[0].to_f32_vec().unwrap(), vec![4.0, 6.0]);
}

#[test]
fn test_state_keeps_its_allocator() {
    let p = provider();
    let info = compile_single(&p, &mlp_graph());
    let ctx = p.compute_context();
    let state = (info.create_state)(&ctx).unwrap();
    assert!(std::sync::Arc::ptr_eq(state.allocator(), ctx.allocator()));
    assert!(std::sync::Arc::ptr_eq(state.allocator(), p.allocator()));
}

#[test]
fn test_single_node_strategy() {
    let p = AccelProvider::new(ProviderConfig {
        strategy: "single-node".into(),
        ..config()
    })
    .unwrap();
    let infos = p.claim_and_compile(&mlp_graph()).unwrap();
    assert_eq!(infos.len(), 3);
    let names: Vec<&str> = infos.iter().map(NodeComputeInfo::name).collect();
    assert_eq!(
        names,
        vec![
            "AccelExecutionProvider_0",
            "AccelExecutionProvider_1",
            "AccelExecutionProvider_2"
        ]
    );
}
