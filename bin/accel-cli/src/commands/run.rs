// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `accel run` command: claim, compile and execute a graph.
//!
//! ```text
//! get_capability → compile → [request × N: create_state → compute per region] → release_state
//! ```
//!
//! Requests run on the blocking pool and share the compiled units, so the
//! first request of each region pays for its compilation and the rest
//! reuse it.

use super::{banner, load_config, load_graph, truncate};
use accel_provider::{AccelProvider, FusedNode, KernelContext, NodeComputeInfo};
use anyhow::Context;
use model_ir::{Graph, Validated};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tensor_core::{DType, Dim, Shape, Tensor, TensorShape};

/// Parses `name=value` for `--dim`.
pub fn parse_dim(s: &str) -> Result<(String, usize), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=SIZE, got '{s}'"))?;
    let size = value
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("invalid size '{value}': {e}"))?;
    Ok((name.trim().to_string(), size))
}

#[derive(Debug, serde::Deserialize)]
struct InputSpec {
    shape: Vec<usize>,
    data: Vec<f32>,
}

pub async fn execute(
    graph_path: PathBuf,
    config_path: Option<PathBuf>,
    inputs_path: Option<PathBuf>,
    dims: Vec<(String, usize)>,
    requests: usize,
    target: Option<String>,
) -> anyhow::Result<()> {
    banner("accel · Runner");

    let config = load_config(config_path, None, target)?;
    let graph = load_graph(&graph_path)?;
    let provider = AccelProvider::new(config)?;

    // ── Claim ──────────────────────────────────────────────────
    println!("  [1/3] Claiming regions...");
    let regions = provider.get_capability(&graph)?;
    let claimed: usize = regions.iter().map(|r| r.num_nodes()).sum();
    println!("        {claimed}/{} nodes in {} regions", graph.num_nodes(), regions.len());
    if claimed != graph.num_nodes() {
        anyhow::bail!(
            "only {claimed} of {} nodes are claimed; `accel run` needs a fully claimed graph",
            graph.num_nodes()
        );
    }

    // ── Compile ────────────────────────────────────────────────
    println!("  [2/3] Preparing fused nodes...");
    let fused: Vec<FusedNode> = regions
        .iter()
        .map(|r| FusedNode::from_capability(&graph, r))
        .collect();
    let infos = Arc::new(provider.compile(&fused)?);
    println!("        {} units, compiled on first use", infos.len());

    // ── Execute ────────────────────────────────────────────────
    // Claimed units hold their own constants; only runtime tensors are fed.
    let feeds = match inputs_path {
        Some(path) => read_inputs(&path)?,
        None => generate_inputs(&graph, &dims)?,
    };

    let requests = requests.max(1);
    println!("  [3/3] Running {requests} request(s)...");
    println!();

    let wanted: Arc<Vec<String>> = Arc::new(graph.outputs().to_vec());
    let feeds = Arc::new(feeds);
    let mut handles = Vec::with_capacity(requests);
    for _ in 0..requests {
        let provider = provider.clone();
        let infos = Arc::clone(&infos);
        let feeds = Arc::clone(&feeds);
        let wanted = Arc::clone(&wanted);
        handles.push(tokio::task::spawn_blocking(move || {
            execute_request(&provider, &infos, (*feeds).clone(), &wanted)
        }));
    }

    let mut first_outputs = None;
    for (i, handle) in handles.into_iter().enumerate() {
        let (outputs, elapsed) = handle.await.context("request task panicked")??;
        println!("  request {i}: {:.2} ms", elapsed.as_secs_f64() * 1000.0);
        first_outputs.get_or_insert(outputs);
    }
    println!();

    if let Some(outputs) = first_outputs {
        println!("  Outputs:");
        for (name, tensor) in &outputs {
            print_tensor(name, tensor)?;
        }
        println!();
    }

    // ── Release ────────────────────────────────────────────────
    let ctx = provider.compute_context();
    println!("  Units:");
    for info in infos.iter() {
        let compilations = info.unit().compilations();
        let state = (info.create_state)(&ctx)?;
        (info.release_state)(Some(state));
        println!(
            "   {:<30} compiled {compilations}x, now {:?}",
            info.name(),
            info.unit().status()
        );
    }
    println!();
    println!(
        "  Constants: {} ({} bytes)",
        provider.constants().len(),
        provider.constants().total_bytes()
    );
    Ok(())
}

/// Runs every region once, in dependency order.
fn execute_request(
    provider: &AccelProvider,
    infos: &[NodeComputeInfo],
    mut env: HashMap<String, Tensor>,
    wanted: &[String],
) -> anyhow::Result<(Vec<(String, Tensor)>, Duration)> {
    let ctx = provider.compute_context();
    let start = Instant::now();

    let mut pending: Vec<&NodeComputeInfo> = infos.iter().collect();
    while !pending.is_empty() {
        let ready = pending.iter().position(|info| {
            info.unit()
                .subgraph()
                .runtime_inputs()
                .all(|name| env.contains_key(name))
        });
        let Some(pos) = ready else {
            let blocked: Vec<&str> = pending.iter().map(|i| i.name()).collect();
            anyhow::bail!("regions {blocked:?} wait on tensors nothing produces");
        };
        let info = pending.remove(pos);
        let subgraph = info.unit().subgraph();

        let inputs = subgraph
            .runtime_inputs()
            .map(|name| env.get(name).cloned().context("missing input"))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let state = (info.create_state)(&ctx)?;
        let mut kernel_ctx = KernelContext::new(inputs);
        (info.compute)(&state, &mut kernel_ctx)?;

        for (name, tensor) in subgraph.outputs().iter().zip(kernel_ctx.into_outputs()) {
            env.insert(name.clone(), tensor);
        }
    }

    let outputs = wanted
        .iter()
        .map(|name| {
            env.remove(name)
                .map(|t| (name.clone(), t))
                .with_context(|| format!("graph output '{name}' was not produced"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok((outputs, start.elapsed()))
}

fn read_inputs(path: &Path) -> anyhow::Result<HashMap<String, Tensor>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read inputs '{}'", path.display()))?;
    let specs: HashMap<String, InputSpec> = serde_json::from_str(&content)?;
    specs
        .into_iter()
        .map(|(name, spec)| {
            let tensor = Tensor::from_f32(Shape::new(spec.shape), &spec.data)
                .with_context(|| format!("input '{name}'"))?;
            Ok((name, tensor))
        })
        .collect()
}

/// Deterministic f32 inputs for every graph input that is not an
/// initializer. Symbolic dims take their `--dim` size, or 1.
fn generate_inputs(
    graph: &Graph<Validated>,
    dims: &[(String, usize)],
) -> anyhow::Result<HashMap<String, Tensor>> {
    let sizes: HashMap<&str, usize> = dims.iter().map(|(n, s)| (n.as_str(), *s)).collect();
    let mut feeds = HashMap::new();
    for name in graph.inputs() {
        if graph.initializer(name).is_some() {
            continue;
        }
        let arg = graph
            .node_arg(name)
            .with_context(|| format!("graph input '{name}' is undeclared"))?;
        if arg.dtype.is_some_and(|d| d != DType::F32) {
            anyhow::bail!("cannot generate input '{name}': only f32 inputs are generated");
        }
        let shape = arg
            .shape
            .as_ref()
            .map(|s| realize(s, &sizes))
            .unwrap_or_else(Shape::scalar);
        let values: Vec<f32> = (0..shape.num_elements())
            .map(|i| (i % 7) as f32 * 0.25 - 0.5)
            .collect();
        feeds.insert(name.clone(), Tensor::from_f32(shape, &values)?);
    }
    Ok(feeds)
}

fn realize(shape: &TensorShape, sizes: &HashMap<&str, usize>) -> Shape {
    Shape::new(
        shape
            .dims()
            .iter()
            .map(|d| match d {
                Dim::Value(v) => usize::try_from(*v).unwrap_or(1),
                Dim::Param(p) => sizes.get(p.as_str()).copied().unwrap_or(1),
                Dim::Unknown => 1,
            })
            .collect(),
    )
}

fn print_tensor(name: &str, tensor: &Tensor) -> anyhow::Result<()> {
    let values = tensor.to_f32_vec()?;
    let shown: Vec<String> = values.iter().take(8).map(|v| format!("{v:.4}")).collect();
    let more = if values.len() > 8 { ", ..." } else { "" };
    println!(
        "   {:<16} {:<12} [{}{more}]",
        truncate(name, 16),
        tensor.shape().to_string(),
        shown.join(", ")
    );
    Ok(())
}
