// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Connected-components partitioning strategy.
//!
//! Grows regions along producer → consumer edges between eligible nodes.
//! Nodes are visited in topological order; an eligible node joins the
//! region of each eligible producer unless the merged region would be
//! reachable from itself through a node outside it.
//!
//! # Cycle Safety
//!
//! ```text
//!        a (eligible)
//!       / \
//!      b   c        b ineligible, c and d eligible
//!       \ /
//!        d
//! ```
//!
//! `c` joins `a`. Merging `d` into `{a, c}` would let the path
//! `a → b → d` leave and re-enter the region, so contracting it would
//! create a cycle with `b`. `d` starts its own region instead.
//!
//! # When to use
//! - Default strategy: fewest regions, largest fusion scope.

use crate::region::{find_reentry, topo_positions, RegionBuilder};
use crate::strategy::PartitionStrategy;
use crate::{ClaimedRegion, PlannerError};
use model_ir::{Graph, Node, Validated};
use std::collections::{BTreeSet, HashSet};

/// Maximal connected groups of eligible nodes.
#[derive(Debug, Clone, Default)]
pub struct ConnectedComponents;

impl ConnectedComponents {
    pub fn new() -> Self {
        Self
    }
}

impl PartitionStrategy for ConnectedComponents {
    fn name(&self) -> &str {
        "connected-components"
    }

    fn partition(
        &self,
        graph: &Graph<Validated>,
        is_supported: &dyn Fn(&Node) -> bool,
        provider: &str,
    ) -> Result<Vec<ClaimedRegion>, PlannerError> {
        let positions = topo_positions(graph);
        let num_nodes = graph.num_nodes();
        let mut sets = UnionFind::new(num_nodes);
        let mut eligible = vec![false; num_nodes];

        for &v in graph.topological_order() {
            let Some(node) = graph.node(v) else {
                return Err(PlannerError::UnknownNode { node: v, num_nodes });
            };
            if !is_supported(node) {
                continue;
            }
            eligible[v] = true;

            let mut candidates: Vec<usize> = graph
                .predecessors(v)
                .into_iter()
                .filter(|&p| eligible[p])
                .map(|p| sets.find(p))
                .collect();
            candidates.sort_unstable();
            candidates.dedup();
            candidates.sort_by_key(|&r| sets.earliest(r, &positions));

            for candidate in candidates {
                let ours = sets.find(v);
                let theirs = sets.find(candidate);
                if ours == theirs {
                    continue;
                }
                let merged: HashSet<usize> = sets.members[ours]
                    .iter()
                    .chain(&sets.members[theirs])
                    .copied()
                    .collect();
                if let Some((exit, _)) = find_reentry(graph, &positions, &merged) {
                    tracing::debug!(
                        "node {v} kept apart from region of node {theirs}: path through node {exit}"
                    );
                    continue;
                }
                sets.union(ours, theirs);
            }
        }

        let roots: BTreeSet<usize> = (0..num_nodes)
            .filter(|&v| eligible[v])
            .map(|v| sets.find(v))
            .collect();

        let mut builder = RegionBuilder::new(provider);
        for root in roots {
            builder.add_region(sets.members[root].clone());
        }
        builder.build(graph)
    }
}

/// Disjoint sets over node indices, each root carrying its member list.
struct UnionFind {
    parent: Vec<usize>,
    members: Vec<Vec<usize>>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            members: (0..n).map(|i| vec![i]).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merges the sets of `a` and `b`; the larger set keeps its root.
    fn union(&mut self, a: usize, b: usize) -> usize {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return ra;
        }
        let (root, child) = if self.members[ra].len() >= self.members[rb].len() {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[child] = root;
        let moved = std::mem::take(&mut self.members[child]);
        self.members[root].extend(moved);
        root
    }

    /// Earliest topological position among the members of `root`.
    fn earliest(&self, root: usize, positions: &[usize]) -> usize {
        self.members[root]
            .iter()
            .map(|&m| positions[m])
            .min()
            .unwrap_or(usize::MAX)
    }
}
