// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # partition-planner
//!
//! Splits a validated [`Graph`] into regions of nodes that an execution
//! provider can take over, using pluggable strategies.
//!
//! # Strategies
//!
//! | Strategy | Regions | Fusion scope |
//! |---|---|---|
//! | [`ConnectedComponents`] | Fewest | Maximal connected eligible groups |
//! | [`SingleNode`] | One per eligible node | None |
//!
//! # Region Invariants
//!
//! Every strategy's output is checked by [`validate_regions`]: regions are
//! non-empty and disjoint, contain only eligible nodes, and contracting
//! any region to a single node keeps the graph acyclic.
//!
//! # Example
//! ```no_run
//! use partition_planner::GraphPartitioner;
//! use model_ir::GraphLoader;
//! use std::path::Path;
//!
//! let graph = GraphLoader::load(Path::new("model.json")).unwrap();
//! let regions = GraphPartitioner::default()
//!     .partition(&graph, "Accel", &|node| node.op_type != "Tile")
//!     .unwrap();
//! for r in &regions {
//!     println!("{}", r.summary());
//! }
//! ```

mod error;
pub(crate) mod region;
pub mod strategy;

pub use error::PlannerError;
pub use region::{validate_regions, ClaimedRegion, MetaDef, RegionBuilder, FUSED_DOMAIN, FUSED_VERSION};
pub use strategy::connected::ConnectedComponents;
pub use strategy::single::SingleNode;
pub use strategy::PartitionStrategy;

use model_ir::{Graph, Node, Validated};

/// Runs a strategy and enforces the region invariants on its output.
pub struct GraphPartitioner {
    strategy: Box<dyn PartitionStrategy>,
}

impl GraphPartitioner {
    pub fn new(strategy: Box<dyn PartitionStrategy>) -> Self {
        Self { strategy }
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Partitions `graph` into regions of nodes accepted by `is_supported`.
    ///
    /// # Errors
    /// Any invariant violation in the strategy's output is returned as a
    /// [`PlannerError`]; callers should treat it as fatal.
    pub fn partition(
        &self,
        graph: &Graph<Validated>,
        provider: &str,
        is_supported: &dyn Fn(&Node) -> bool,
    ) -> Result<Vec<ClaimedRegion>, PlannerError> {
        let regions = self.strategy.partition(graph, is_supported, provider)?;
        validate_regions(graph, &regions, is_supported)?;

        let claimed: usize = regions.iter().map(ClaimedRegion::num_nodes).sum();
        tracing::info!(
            "strategy '{}' claimed {claimed}/{} nodes in {} regions",
            self.strategy.name(),
            graph.num_nodes(),
            regions.len(),
        );
        for region in &regions {
            tracing::debug!("{}", region.summary());
        }
        Ok(regions)
    }
}

impl Default for GraphPartitioner {
    fn default() -> Self {
        Self::new(Box::new(ConnectedComponents::new()))
    }
}

impl std::fmt::Debug for GraphPartitioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphPartitioner")
            .field("strategy", &self.strategy.name())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_graphs::{chain, diamond};

    #[test]
    fn test_default_strategy() {
        assert_eq!(GraphPartitioner::default().strategy_name(), "connected-components");
    }

    #[test]
    fn test_partition_chain() {
        let g = chain(&["Relu", "Tile", "Relu"]);
        let regions = GraphPartitioner::default()
            .partition(&g, "Accel", &|n| n.op_type != "Tile")
            .unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].node_indices, vec![0]);
        assert_eq!(regions[1].node_indices, vec![2]);
    }

    #[test]
    fn test_partition_single_node() {
        let g = diamond(&["Relu", "Relu", "Relu", "Add"]);
        let partitioner = GraphPartitioner::new(Box::new(SingleNode::new()));
        let regions = partitioner.partition(&g, "Accel", &|_| true).unwrap();
        assert_eq!(regions.len(), 4);
    }

    /// A strategy that ignores the predicate is caught by validation.
    struct ClaimAll;

    impl PartitionStrategy for ClaimAll {
        fn name(&self) -> &str {
            "claim-all"
        }

        fn partition(
            &self,
            graph: &Graph<Validated>,
            _is_supported: &dyn Fn(&Node) -> bool,
            provider: &str,
        ) -> Result<Vec<ClaimedRegion>, PlannerError> {
            let mut b = RegionBuilder::new(provider);
            b.add_region((0..graph.num_nodes()).collect());
            b.build(graph)
        }
    }

    #[test]
    fn test_invalid_strategy_output_is_fatal() {
        let g = chain(&["Relu", "Tile", "Relu"]);
        let partitioner = GraphPartitioner::new(Box::new(ClaimAll));
        let err = partitioner
            .partition(&g, "Accel", &|n| n.op_type != "Tile")
            .unwrap_err();
        assert!(matches!(err, PlannerError::IneligibleNode { node: 1, .. }));
    }
}
