// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Claimed regions: the output of the partitioner.
//!
//! A [`ClaimedRegion`] is a set of nodes the provider will fuse into one
//! compiled unit, plus a [`MetaDef`] naming the fused node and its
//! boundary tensors. Regions are the contract between the partitioner and
//! the provider's compile step.

use crate::PlannerError;
use model_ir::{Graph, Node, Validated};
use std::collections::{HashMap, HashSet};

/// Domain of every fused node emitted by the partitioner.
pub const FUSED_DOMAIN: &str = "com.accel";

/// Opset version of every fused node.
pub const FUSED_VERSION: i64 = 1;

/// Signature of a fused node.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MetaDef {
    /// `"{provider}_{region_index}"`.
    pub name: String,
    pub domain: String,
    pub since_version: i64,
    /// Tensors read inside the region but produced outside it, in
    /// first-use order.
    pub inputs: Vec<String>,
    /// Tensors produced inside the region that are read outside it or are
    /// graph outputs, in production order.
    pub outputs: Vec<String>,
}

impl MetaDef {
    /// Computes the boundary of `members`, walking them in topological order.
    fn for_region(graph: &Graph<Validated>, ordered: &[usize], name: String) -> Self {
        let members: HashSet<usize> = ordered.iter().copied().collect();
        let mut inputs = Vec::new();
        let mut seen = HashSet::new();
        let mut outputs = Vec::new();

        for node in ordered.iter().filter_map(|&i| graph.node(i)) {
            for input in node.present_inputs() {
                let produced_inside = graph
                    .producer(input)
                    .is_some_and(|p| members.contains(&p));
                if !produced_inside && seen.insert(input) {
                    inputs.push(input.to_string());
                }
            }
            for output in node.outputs.iter().filter(|o| !o.is_empty()) {
                let escapes = graph.is_graph_output(output)
                    || graph
                        .consumers(output)
                        .iter()
                        .any(|c| !members.contains(c));
                if escapes {
                    outputs.push(output.clone());
                }
            }
        }

        Self {
            name,
            domain: FUSED_DOMAIN.to_string(),
            since_version: FUSED_VERSION,
            inputs,
            outputs,
        }
    }
}

/// A maximal group of eligible nodes claimed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ClaimedRegion {
    /// Position of this region in the partitioner's output.
    pub region_index: usize,
    /// Member node indices, ascending.
    pub node_indices: Vec<usize>,
    pub meta_def: MetaDef,
}

impl ClaimedRegion {
    pub fn num_nodes(&self) -> usize {
        self.node_indices.len()
    }

    pub fn contains(&self, node: usize) -> bool {
        self.node_indices.binary_search(&node).is_ok()
    }

    /// Member nodes in the graph's topological order.
    pub fn nodes_in_order<'g>(&self, graph: &'g Graph<Validated>) -> Vec<&'g Node> {
        graph
            .topological_order()
            .iter()
            .filter(|&&i| self.contains(i))
            .filter_map(|&i| graph.node(i))
            .collect()
    }

    /// Returns a one-line description for logs and the CLI.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} nodes {:?}, inputs [{}], outputs [{}]",
            self.meta_def.name,
            self.num_nodes(),
            self.node_indices,
            self.meta_def.inputs.join(", "),
            self.meta_def.outputs.join(", "),
        )
    }
}

/// Builder for the region list returned by a strategy.
///
/// Strategies add raw node groups in any order; [`build`](Self::build)
/// drops empty groups, orders the rest by their earliest topological
/// position and attaches MetaDefs.
pub struct RegionBuilder {
    provider: String,
    groups: Vec<Vec<usize>>,
}

impl RegionBuilder {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            groups: Vec::new(),
        }
    }

    pub fn add_region(&mut self, nodes: Vec<usize>) {
        self.groups.push(nodes);
    }

    /// Consumes the builder and materializes the regions.
    pub fn build(self, graph: &Graph<Validated>) -> Result<Vec<ClaimedRegion>, PlannerError> {
        let positions = topo_positions(graph);
        let num_nodes = graph.num_nodes();

        let mut groups: Vec<Vec<usize>> = Vec::with_capacity(self.groups.len());
        for mut group in self.groups.into_iter().filter(|g| !g.is_empty()) {
            if let Some(&node) = group.iter().find(|&&n| n >= num_nodes) {
                return Err(PlannerError::UnknownNode { node, num_nodes });
            }
            group.sort_by_key(|&n| positions[n]);
            group.dedup();
            groups.push(group);
        }
        groups.sort_by_key(|g| positions[g[0]]);

        Ok(groups
            .into_iter()
            .enumerate()
            .map(|(region_index, ordered)| {
                let name = format!("{}_{region_index}", self.provider);
                let meta_def = MetaDef::for_region(graph, &ordered, name);
                let mut node_indices = ordered;
                node_indices.sort_unstable();
                ClaimedRegion {
                    region_index,
                    node_indices,
                    meta_def,
                }
            })
            .collect())
    }
}

/// Checks every region invariant.
///
/// - no region is empty;
/// - no node belongs to two regions;
/// - every member satisfies `is_supported`;
/// - contracting any region to one node keeps the graph acyclic.
pub fn validate_regions(
    graph: &Graph<Validated>,
    regions: &[ClaimedRegion],
    is_supported: &dyn Fn(&Node) -> bool,
) -> Result<(), PlannerError> {
    let positions = topo_positions(graph);
    let num_nodes = graph.num_nodes();
    let mut owner: HashMap<usize, usize> = HashMap::new();

    for region in regions {
        let id = region.region_index;
        if region.node_indices.is_empty() {
            return Err(PlannerError::EmptyRegion { region: id });
        }

        for &node in &region.node_indices {
            let Some(n) = graph.node(node) else {
                return Err(PlannerError::UnknownNode { node, num_nodes });
            };
            if let Some(first) = owner.insert(node, id) {
                return Err(PlannerError::OverlappingRegions {
                    node,
                    first,
                    second: id,
                });
            }
            if !is_supported(n) {
                return Err(PlannerError::IneligibleNode { region: id, node });
            }
        }

        let members: HashSet<usize> = region.node_indices.iter().copied().collect();
        if let Some((exit, reentry)) = find_reentry(graph, &positions, &members) {
            return Err(PlannerError::CyclicRegion {
                region: id,
                detail: format!("path leaves through node {exit} and re-enters at node {reentry}"),
            });
        }
    }

    Ok(())
}

/// `positions[node]` is the node's slot in the topological order.
pub(crate) fn topo_positions(graph: &Graph<Validated>) -> Vec<usize> {
    let mut positions = vec![0; graph.num_nodes()];
    for (pos, &node) in graph.topological_order().iter().enumerate() {
        positions[node] = pos;
    }
    positions
}

/// Looks for a path that leaves `members` and comes back into it.
///
/// Returns the last outside node on such a path and the member it
/// re-enters at. Outside nodes positioned after the last member cannot
/// reach back, so the search never visits them.
pub(crate) fn find_reentry(
    graph: &Graph<Validated>,
    positions: &[usize],
    members: &HashSet<usize>,
) -> Option<(usize, usize)> {
    let max_pos = members.iter().map(|&n| positions[n]).max()?;
    let mut seen = HashSet::new();
    let mut stack = Vec::new();

    for &m in members {
        for s in graph.successors(m) {
            if !members.contains(&s) && positions[s] < max_pos && seen.insert(s) {
                stack.push(s);
            }
        }
    }

    while let Some(n) = stack.pop() {
        for s in graph.successors(n) {
            if members.contains(&s) {
                return Some((n, s));
            }
            if positions[s] < max_pos && seen.insert(s) {
                stack.push(s);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_graphs::{chain, diamond};

    #[test]
    fn test_builder_orders_and_names() {
        let g = chain(&["Relu", "Relu", "Relu"]);
        let mut b = RegionBuilder::new("Accel");
        b.add_region(vec![2]);
        b.add_region(vec![]);
        b.add_region(vec![1, 0]);
        let regions = b.build(&g).unwrap();

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].node_indices, vec![0, 1]);
        assert_eq!(regions[0].meta_def.name, "Accel_0");
        assert_eq!(regions[1].meta_def.name, "Accel_1");
        assert_eq!(regions[1].meta_def.domain, FUSED_DOMAIN);
        assert_eq!(regions[1].meta_def.since_version, 1);
    }

    #[test]
    fn test_meta_def_boundary() {
        // x -> n0 -> t0 -> n1 -> t1 -> n2 -> y
        let g = chain(&["Relu", "Relu", "Relu"]);
        let mut b = RegionBuilder::new("Accel");
        b.add_region(vec![0, 1]);
        let regions = b.build(&g).unwrap();

        assert_eq!(regions[0].meta_def.inputs, vec!["x"]);
        assert_eq!(regions[0].meta_def.outputs, vec!["t1"]);
    }

    #[test]
    fn test_meta_def_graph_output_and_dedup() {
        let g = diamond(&["Relu", "Relu", "Relu", "Add"]);
        let mut b = RegionBuilder::new("Accel");
        b.add_region(vec![0, 1, 2, 3]);
        let regions = b.build(&g).unwrap();

        assert_eq!(regions[0].meta_def.inputs, vec!["x"]);
        assert_eq!(regions[0].meta_def.outputs, vec!["y"]);
    }

    #[test]
    fn test_builder_unknown_node() {
        let g = chain(&["Relu"]);
        let mut b = RegionBuilder::new("Accel");
        b.add_region(vec![5]);
        assert!(matches!(
            b.build(&g),
            Err(PlannerError::UnknownNode { node: 5, .. })
        ));
    }

    #[test]
    fn test_validate_overlap() {
        let g = chain(&["Relu", "Relu"]);
        let mut b = RegionBuilder::new("Accel");
        b.add_region(vec![0, 1]);
        b.add_region(vec![1]);
        let regions = b.build(&g).unwrap();
        let err = validate_regions(&g, &regions, &|_| true).unwrap_err();
        assert!(matches!(err, PlannerError::OverlappingRegions { node: 1, .. }));
    }

    #[test]
    fn test_validate_ineligible() {
        let g = chain(&["Relu", "Tile"]);
        let mut b = RegionBuilder::new("Accel");
        b.add_region(vec![0, 1]);
        let regions = b.build(&g).unwrap();
        let err = validate_regions(&g, &regions, &|n| n.op_type != "Tile").unwrap_err();
        assert!(matches!(err, PlannerError::IneligibleNode { node: 1, .. }));
    }

    #[test]
    fn test_validate_cycle() {
        // Diamond with the left branch outside the region.
        let g = diamond(&["Relu", "Relu", "Relu", "Add"]);
        let mut b = RegionBuilder::new("Accel");
        b.add_region(vec![0, 2, 3]);
        let regions = b.build(&g).unwrap();
        let err = validate_regions(&g, &regions, &|_| true).unwrap_err();
        assert!(matches!(err, PlannerError::CyclicRegion { region: 0, .. }));
    }

    #[test]
    fn test_contains_and_order() {
        let g = diamond(&["Relu", "Relu", "Relu", "Add"]);
        let mut b = RegionBuilder::new("Accel");
        b.add_region(vec![3, 1, 2, 0]);
        let regions = b.build(&g).unwrap();
        let r = &regions[0];
        assert!(r.contains(2));
        assert!(!r.contains(7));
        let ordered: Vec<usize> = r.nodes_in_order(&g).iter().map(|n| n.index).collect();
        assert_eq!(ordered, g.topological_order().to_vec());
        assert!(r.summary().starts_with("Accel_0: 4 nodes"));
    }
}
