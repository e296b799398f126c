// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `accel partition` command: show the regions the provider claims.

use super::{banner, load_config, load_graph, truncate};
use accel_provider::AccelProvider;
use std::path::PathBuf;

pub async fn execute(
    graph_path: PathBuf,
    config_path: Option<PathBuf>,
    strategy: Option<String>,
    target: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(config_path, strategy, target)?;
    let graph = load_graph(&graph_path)?;
    let provider = AccelProvider::new(config)?;
    let regions = provider.get_capability(&graph)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&regions)?);
        return Ok(());
    }

    banner("accel · Partition");
    println!("  {}", graph.summary());
    println!(
        "  Provider: {} (target {}, strategy {})",
        provider.provider_type(),
        provider.target(),
        provider.strategy_name()
    );
    println!();

    let claimed: usize = regions.iter().map(|r| r.num_nodes()).sum();
    println!(
        "  Claimed {claimed}/{} nodes in {} regions",
        graph.num_nodes(),
        regions.len()
    );
    println!();

    for region in &regions {
        println!("  {}", region.meta_def.name);
        let ops: Vec<String> = region
            .nodes_in_order(&graph)
            .iter()
            .map(|n| format!("{}:{}", n.name, n.op_type))
            .collect();
        println!("   nodes:   {}", truncate(&ops.join(" → "), 80));
        println!("   inputs:  {}", region.meta_def.inputs.join(", "));
        println!("   outputs: {}", region.meta_def.outputs.join(", "));
        println!();
    }

    let unclaimed: Vec<&str> = graph
        .nodes()
        .iter()
        .filter(|n| !regions.iter().any(|r| r.contains(n.index)))
        .map(|n| n.name.as_str())
        .collect();
    if !unclaimed.is_empty() {
        println!("  Left to the default provider: {}", unclaimed.join(", "));
        println!();
    }

    let constants = provider.constants();
    println!(
        "  Captured {} constants ({} bytes), allocator {} in use",
        constants.len(),
        constants.total_bytes(),
        provider.allocator().allocated_bytes()
    );
    Ok(())
}
