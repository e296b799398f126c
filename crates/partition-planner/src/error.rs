// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the partition planner.

/// Errors that can occur during partitioning.
///
/// Every variant describes a broken region invariant; callers treat them
/// as fatal rather than as a reason to decline the graph.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    /// A strategy referenced a node index the graph does not have.
    #[error("node index {node} is out of range (graph has {num_nodes} nodes)")]
    UnknownNode { node: usize, num_nodes: usize },

    /// A region was produced with no nodes.
    #[error("region {region} is empty")]
    EmptyRegion { region: usize },

    /// A node was claimed by two regions.
    #[error("node {node} is claimed by regions {first} and {second}")]
    OverlappingRegions {
        node: usize,
        first: usize,
        second: usize,
    },

    /// A region contains a node the eligibility predicate rejects.
    #[error("region {region} contains ineligible node {node}")]
    IneligibleNode { region: usize, node: usize },

    /// Contracting the region to a single node would create a cycle.
    #[error("region {region} would create a cycle: {detail}")]
    CyclicRegion { region: usize, detail: String },

    /// No strategy is registered under the requested name.
    #[error("unknown partition strategy '{0}' (expected 'connected-components' or 'single-node')")]
    UnknownStrategy(String),

    /// The chosen strategy failed for another reason.
    #[error("strategy '{strategy}' failed: {detail}")]
    StrategyFailed { strategy: String, detail: String },
}
