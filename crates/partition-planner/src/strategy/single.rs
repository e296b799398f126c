// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Single-node partitioning strategy.
//!
//! Every eligible node forms its own region. Nothing is fused, which makes
//! each operator's compiled unit observable in isolation.
//!
//! # When to use
//! - Debugging a miscompiled region.
//! - Baseline for measuring what fusion buys.

use crate::region::RegionBuilder;
use crate::strategy::PartitionStrategy;
use crate::{ClaimedRegion, PlannerError};
use model_ir::{Graph, Node, Validated};

/// One region per eligible node.
#[derive(Debug, Clone, Default)]
pub struct SingleNode;

impl SingleNode {
    pub fn new() -> Self {
        Self
    }
}

impl PartitionStrategy for SingleNode {
    fn name(&self) -> &str {
        "single-node"
    }

    fn partition(
        &self,
        graph: &Graph<Validated>,
        is_supported: &dyn Fn(&Node) -> bool,
        provider: &str,
    ) -> Result<Vec<ClaimedRegion>, PlannerError> {
        let mut builder = RegionBuilder::new(provider);
        for node in graph.nodes().iter().filter(|n| is_supported(n)) {
            builder.add_region(vec![node.index]);
        }
        builder.build(graph)
    }
}
