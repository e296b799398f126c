// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operator graph: nodes connected by named tensors.
//!
//! # Type-State Pattern
//!
//! The graph transitions through states enforced at compile time:
//!
//! ```text
//! Graph<Loaded>: nodes parsed, not yet checked.
//!       │  .validate()
//!       ▼
//! Graph<Validated>: wiring verified, acyclic, indexed for traversal.
//! ```
//!
//! The partitioner and the provider only accept `Graph<Validated>`, so
//! they never observe dangling tensors or cycles. Validation also builds
//! the producer/consumer indices and a deterministic topological order.

use crate::{Attribute, ModelError, Node, NodeArg, TensorProto};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use tensor_core::TensorShape;

// ── Type-state markers ─────────────────────────────────────────────

/// Marker: graph has been loaded but not validated.
#[derive(Debug, Clone)]
pub struct Loaded;

/// Marker: graph has been validated and is ready for partitioning.
#[derive(Debug, Clone)]
pub struct Validated;

/// Sealed trait for graph states.
pub trait GraphState: fmt::Debug + Clone {}
impl GraphState for Loaded {}
impl GraphState for Validated {}

// ── Graph ──────────────────────────────────────────────────────────

/// A computation graph. The generic parameter `S` encodes the validation
/// state at compile time.
#[derive(Debug, Clone)]
pub struct Graph<S: GraphState = Loaded> {
    pub name: String,
    nodes: Vec<Node>,
    node_args: BTreeMap<String, NodeArg>,
    initializers: BTreeMap<String, TensorProto>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    domain_to_version: BTreeMap<String, i64>,
    // Populated by `validate`.
    topo_order: Vec<usize>,
    producers: HashMap<String, usize>,
    consumers: HashMap<String, Vec<usize>>,
    _state: PhantomData<S>,
}

// ── Loaded state ───────────────────────────────────────────────────

impl Graph<Loaded> {
    /// Creates an empty graph in the `Loaded` state.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            node_args: BTreeMap::new(),
            initializers: BTreeMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            domain_to_version: BTreeMap::new(),
            topo_order: Vec::new(),
            producers: HashMap::new(),
            consumers: HashMap::new(),
            _state: PhantomData,
        }
    }

    /// Imports `domain` at opset `version`.
    pub fn with_opset(mut self, domain: impl Into<String>, version: i64) -> Self {
        self.domain_to_version.insert(domain.into(), version);
        self
    }

    /// Declares a graph input.
    pub fn add_input(&mut self, arg: NodeArg) {
        self.inputs.push(arg.name.clone());
        self.node_args.insert(arg.name.clone(), arg);
    }

    /// Declares a graph output.
    pub fn add_output(&mut self, arg: NodeArg) {
        self.outputs.push(arg.name.clone());
        self.merge_arg(arg);
    }

    /// Records metadata for an intermediate tensor.
    pub fn add_value_info(&mut self, arg: NodeArg) {
        self.merge_arg(arg);
    }

    /// Adds an initializer. Its shape and element type become the tensor's
    /// metadata unless something more specific was already declared.
    pub fn add_initializer(&mut self, tensor: TensorProto) {
        let name = tensor.name.clone();
        self.node_args.entry(name.clone()).or_insert_with(|| {
            let shape = TensorShape::new(tensor.dims.iter().map(|&d| d.into()).collect());
            NodeArg::new(name.clone(), Some(shape), tensor.dtype())
        });
        self.initializers.insert(name, tensor);
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    fn merge_arg(&mut self, arg: NodeArg) {
        match self.node_args.get_mut(&arg.name) {
            Some(existing) => {
                if arg.shape.is_some() {
                    existing.shape = arg.shape;
                }
                if arg.dtype.is_some() {
                    existing.dtype = arg.dtype;
                }
            }
            None => {
                self.node_args.insert(arg.name.clone(), arg);
            }
        }
    }

    /// Validates the graph and transitions to the `Validated` state.
    ///
    /// # Checks
    /// - Node indices are consecutive starting from 0.
    /// - Every node's domain is imported; a zero `since_version` is
    ///   resolved to the imported opset.
    /// - Every tensor has at most one producer, and every consumed tensor
    ///   is produced by a node, is a graph input or is an initializer.
    /// - Every graph output is available.
    /// - The graph is acyclic.
    pub fn validate(mut self) -> Result<Graph<Validated>, ModelError> {
        for (i, node) in self.nodes.iter_mut().enumerate() {
            if node.index != i {
                return Err(ModelError::InvalidNode {
                    node: node.name.clone(),
                    detail: format!("expected index {i}, got {}", node.index),
                });
            }
            let Some(&opset) = self.domain_to_version.get(&node.domain) else {
                return Err(ModelError::InvalidNode {
                    node: node.name.clone(),
                    detail: format!("domain '{}' is not imported", node.domain),
                });
            };
            if node.since_version == 0 {
                node.since_version = opset;
            } else if node.since_version > opset {
                return Err(ModelError::InvalidNode {
                    node: node.name.clone(),
                    detail: format!(
                        "defined against opset {} but the graph imports {opset}",
                        node.since_version
                    ),
                });
            }
        }

        let graph_inputs: HashSet<&str> = self.inputs.iter().map(String::as_str).collect();

        let mut producers = HashMap::new();
        for node in &self.nodes {
            for out in node.outputs.iter().filter(|o| !o.is_empty()) {
                if graph_inputs.contains(out.as_str())
                    || self.initializers.contains_key(out)
                    || producers.insert(out.clone(), node.index).is_some()
                {
                    return Err(ModelError::InvalidNode {
                        node: node.name.clone(),
                        detail: format!("tensor '{out}' has more than one source"),
                    });
                }
            }
        }

        let available = |name: &str| {
            producers.contains_key(name)
                || graph_inputs.contains(name)
                || self.initializers.contains_key(name)
        };

        let mut consumers: HashMap<String, Vec<usize>> = HashMap::new();
        for node in &self.nodes {
            for input in node.present_inputs() {
                if !available(input) {
                    return Err(ModelError::InvalidNode {
                        node: node.name.clone(),
                        detail: format!("input '{input}' has no producer"),
                    });
                }
                let list = consumers.entry(input.to_string()).or_default();
                if list.last() != Some(&node.index) {
                    list.push(node.index);
                }
            }
        }

        for out in &self.outputs {
            if !available(out) {
                return Err(ModelError::InvalidGraph(format!(
                    "graph output '{out}' is never produced"
                )));
            }
        }

        let topo_order = kahn_order(&self.nodes, &producers).ok_or_else(|| {
            ModelError::InvalidGraph("graph contains a cycle".into())
        })?;

        // Every tensor gets a metadata entry, even if nothing was declared.
        for node in &self.nodes {
            for name in node.tensors() {
                self.node_args
                    .entry(name.to_string())
                    .or_insert_with(|| NodeArg::new(name, None, None));
            }
        }

        tracing::debug!(
            "validated graph '{}': {} nodes, {} initializers",
            self.name,
            self.nodes.len(),
            self.initializers.len()
        );

        Ok(Graph {
            name: self.name,
            nodes: self.nodes,
            node_args: self.node_args,
            initializers: self.initializers,
            inputs: self.inputs,
            outputs: self.outputs,
            domain_to_version: self.domain_to_version,
            topo_order,
            producers,
            consumers,
            _state: PhantomData,
        })
    }
}

/// Kahn's algorithm, always releasing the smallest ready node index first
/// so the order is deterministic. Returns `None` if the graph has a cycle.
fn kahn_order(nodes: &[Node], producers: &HashMap<String, usize>) -> Option<Vec<usize>> {
    let preds: Vec<Vec<usize>> = nodes
        .iter()
        .map(|n| distinct_producers(n, producers))
        .collect();

    let mut succs = vec![Vec::new(); nodes.len()];
    let mut indegree = vec![0usize; nodes.len()];
    for (i, ps) in preds.iter().enumerate() {
        indegree[i] = ps.len();
        for &p in ps {
            succs[p].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = indegree
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &s in &succs[i] {
            indegree[s] -= 1;
            if indegree[s] == 0 {
                ready.push(Reverse(s));
            }
        }
    }

    (order.len() == nodes.len()).then_some(order)
}

fn distinct_producers(node: &Node, producers: &HashMap<String, usize>) -> Vec<usize> {
    let mut ps: Vec<usize> = node
        .present_inputs()
        .filter_map(|i| producers.get(i).copied())
        .collect();
    ps.sort_unstable();
    ps.dedup();
    ps
}

// ── Validated state ────────────────────────────────────────────────

impl Graph<Validated> {
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the nodes in index order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    /// Node indices in deterministic topological order.
    pub fn topological_order(&self) -> &[usize] {
        &self.topo_order
    }

    /// Index of the node producing `tensor`, if any.
    pub fn producer(&self, tensor: &str) -> Option<usize> {
        self.producers.get(tensor).copied()
    }

    /// Indices of the nodes reading `tensor`, ascending.
    pub fn consumers(&self, tensor: &str) -> &[usize] {
        self.consumers.get(tensor).map_or(&[], Vec::as_slice)
    }

    /// Distinct producer nodes of `index`'s inputs, ascending.
    pub fn predecessors(&self, index: usize) -> Vec<usize> {
        self.nodes
            .get(index)
            .map(|n| distinct_producers(n, &self.producers))
            .unwrap_or_default()
    }

    /// Distinct consumer nodes of `index`'s outputs, ascending.
    pub fn successors(&self, index: usize) -> Vec<usize> {
        let Some(node) = self.nodes.get(index) else {
            return Vec::new();
        };
        let mut out: Vec<usize> = node
            .outputs
            .iter()
            .flat_map(|o| self.consumers(o).iter().copied())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn node_arg(&self, name: &str) -> Option<&NodeArg> {
        self.node_args.get(name)
    }

    pub fn node_args(&self) -> impl Iterator<Item = &NodeArg> {
        self.node_args.values()
    }

    pub fn initializer(&self, name: &str) -> Option<&TensorProto> {
        self.initializers.get(name)
    }

    pub fn initializers(&self) -> impl Iterator<Item = &TensorProto> {
        self.initializers.values()
    }

    /// Returns `true` if `name` is an initializer that is not also a graph
    /// input. A graph input of the same name may override the initializer
    /// at run time, so only the former is a true constant.
    pub fn is_constant_initializer(&self, name: &str) -> bool {
        self.initializers.contains_key(name) && !self.inputs.iter().any(|i| i == name)
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn is_graph_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|i| i == name)
    }

    pub fn is_graph_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|o| o == name)
    }

    /// Opset imported for each domain.
    pub fn domain_to_version(&self) -> &BTreeMap<String, i64> {
        &self.domain_to_version
    }

    /// Convenience accessor for a node's attribute.
    pub fn attribute(&self, node: usize, key: &str) -> Option<&Attribute> {
        self.nodes.get(node).and_then(|n| n.attribute(key))
    }

    /// Returns a summary string describing the graph.
    pub fn summary(&self) -> String {
        let mut ops: BTreeMap<&str, usize> = BTreeMap::new();
        for n in &self.nodes {
            *ops.entry(n.op_type.as_str()).or_default() += 1;
        }
        let histogram: Vec<String> = ops.iter().map(|(op, c)| format!("{op}x{c}")).collect();
        format!(
            "Graph '{}': {} nodes, {} inputs, {} outputs, {} initializers [{}]",
            self.name,
            self.nodes.len(),
            self.inputs.len(),
            self.outputs.len(),
            self.initializers.len(),
            histogram.join(" "),
        )
    }
}

// ── Shared implementations ─────────────────────────────────────────

impl<S: GraphState> fmt::Display for Graph<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Graph '{}' ({} nodes):", self.name, self.nodes.len())?;
        for node in &self.nodes {
            writeln!(f, "  {}", node.summary())?;
        }
        Ok(())
    }
}
