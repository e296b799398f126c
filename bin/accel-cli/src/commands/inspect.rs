// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `accel inspect` command: display graph structure and inferred shapes.

use super::{banner, load_graph, truncate};
use accel_provider::{
    DeclaredShapeInference, KernelRegistry, ShapeExprContext, ShapeInference, PROVIDER_TYPE,
};
use std::path::PathBuf;

pub async fn execute(graph_path: PathBuf) -> anyhow::Result<()> {
    banner("accel · Graph Inspector");

    let graph = load_graph(&graph_path)?;

    // ── Summary ────────────────────────────────────────────────
    println!("  {}", graph.summary());
    for (domain, version) in graph.domain_to_version() {
        let shown = if domain.is_empty() { "ai.onnx" } else { domain };
        println!("   opset {shown}: {version}");
    }
    println!();

    let shapes = ShapeExprContext::new();
    if let Err(e) = DeclaredShapeInference::new().infer(&graph, &shapes) {
        println!("  Shape inference failed: {e}");
        println!("  The provider would decline this graph.");
        println!();
    }

    // ── Per-Node Detail ────────────────────────────────────────
    println!(
        "  {:<4} {:<20} {:<20} {:>4}  {:<8} {:<30}",
        "Idx", "Name", "Op", "Ver", "Kernel", "Output shape",
    );
    println!("  {}", "-".repeat(92));

    let registry = KernelRegistry::builtin();
    for &index in graph.topological_order() {
        let Some(node) = graph.node(index) else {
            continue;
        };
        let kernel = match registry.find_kernel(node, PROVIDER_TYPE) {
            Some(k) => k.version_range(),
            None => "-".to_string(),
        };
        let output_shape = node
            .outputs
            .first()
            .and_then(|o| shapes.get(o))
            .map_or_else(|| "?".to_string(), |s| s.to_string());
        println!(
            "  {:<4} {:<20} {:<20} {:>4}  {:<8} {:<30}",
            node.index,
            truncate(&node.name, 20),
            truncate(&node.op_type, 20),
            node.since_version,
            kernel,
            truncate(&output_shape, 30),
        );
    }
    println!();

    // ── Initializers ───────────────────────────────────────────
    let mut inits: Vec<_> = graph.initializers().collect();
    inits.sort_by(|a, b| a.name.cmp(&b.name));
    if !inits.is_empty() {
        println!("  Initializers:");
        for init in inits {
            let dtype = init.dtype().map_or("?", |d| d.as_str());
            let constant = if graph.is_constant_initializer(&init.name) {
                "constant"
            } else {
                "overridable"
            };
            println!(
                "   {:<24} {:<6} {:?} ({constant})",
                truncate(&init.name, 24),
                dtype,
                init.dims
            );
        }
        println!();
    }

    Ok(())
}
