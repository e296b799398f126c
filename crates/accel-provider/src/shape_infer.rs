// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Whole-graph shape inference.
//!
//! Inference runs once per `get_capability` call into a fresh
//! [`ShapeExprContext`], which is then merged into the provider-wide one.
//! `compile` freezes the shapes of each region's tensors into its unit, so
//! claiming another graph later does not change what a unit validates.

use crate::ProviderError;
use model_ir::{Graph, Node, Validated};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tensor_core::{Dim, TensorShape};

/// Shared snapshot of tensor name → inferred shape.
#[derive(Debug, Clone, Default)]
pub struct ShapeExprContext {
    shapes: Arc<RwLock<HashMap<String, TensorShape>>>,
}

impl ShapeExprContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<TensorShape> {
        self.shapes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    pub fn insert(&self, name: impl Into<String>, shape: TensorShape) {
        self.shapes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.into(), shape);
    }

    /// Adds `shapes`, overwriting entries with the same name and keeping
    /// every other entry.
    pub fn merge(&self, shapes: HashMap<String, TensorShape>) {
        self.shapes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(shapes);
    }

    /// An independent context holding only the entries of `names`.
    pub fn subset<'n>(&self, names: impl IntoIterator<Item = &'n str>) -> ShapeExprContext {
        let shapes = self
            .shapes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let picked = names
            .into_iter()
            .filter_map(|n| shapes.get(n).map(|s| (n.to_string(), s.clone())))
            .collect();
        ShapeExprContext {
            shapes: Arc::new(RwLock::new(picked)),
        }
    }

    /// Copies the current snapshot.
    pub fn snapshot(&self) -> HashMap<String, TensorShape> {
        self.shapes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.shapes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A whole-graph shape inference pass.
pub trait ShapeInference: Send + Sync {
    /// Infers shapes for `graph` and merges them into `ctx`.
    ///
    /// # Errors
    /// [`ProviderError::ShapeInferenceFailed`] when the graph cannot be
    /// shaped at all. Individual tensors that stay unshaped are not errors.
    fn infer(&self, graph: &Graph<Validated>, ctx: &ShapeExprContext) -> Result<(), ProviderError>;
}

/// Uses declared shapes and propagates them through shape-preserving
/// operators.
///
/// Seeds from graph inputs, initializer dims and every declared tensor
/// shape, then walks nodes in topological order filling undeclared
/// outputs of unary elementwise ops, `Softmax`, `LayerNormalization` and
/// broadcasting binary elementwise ops.
#[derive(Debug, Clone, Default)]
pub struct DeclaredShapeInference;

impl DeclaredShapeInference {
    pub fn new() -> Self {
        Self
    }
}

impl ShapeInference for DeclaredShapeInference {
    fn infer(&self, graph: &Graph<Validated>, ctx: &ShapeExprContext) -> Result<(), ProviderError> {
        let mut shapes: HashMap<String, TensorShape> = HashMap::new();

        for name in graph.inputs() {
            if graph.node_arg(name).and_then(|a| a.shape.as_ref()).is_none() {
                return Err(ProviderError::ShapeInferenceFailed(format!(
                    "graph input '{name}' has no shape"
                )));
            }
        }

        for arg in graph.node_args() {
            if let Some(shape) = &arg.shape {
                shapes.insert(arg.name.clone(), shape.clone());
            }
        }

        for init in graph.initializers() {
            let from_dims = TensorShape::new(init.dims.iter().map(|&d| Dim::Value(d)).collect());
            match shapes.get(&init.name) {
                Some(declared) if declared.rank() != from_dims.rank() => {
                    return Err(ProviderError::ShapeInferenceFailed(format!(
                        "initializer '{}' has dims {from_dims} but is declared as {declared}",
                        init.name
                    )));
                }
                Some(_) => {}
                None => {
                    shapes.insert(init.name.clone(), from_dims);
                }
            }
        }

        for node in graph.topological_order().iter().filter_map(|&i| graph.node(i)) {
            for (pos, output) in node.outputs.iter().enumerate() {
                if output.is_empty() || shapes.contains_key(output) {
                    continue;
                }
                if let Some(shape) = propagate(node, pos, &shapes) {
                    shapes.insert(output.clone(), shape);
                }
            }
        }

        tracing::debug!("shape inference resolved {} tensors", shapes.len());
        ctx.merge(shapes);
        Ok(())
    }
}

fn propagate(node: &Node, output: usize, shapes: &HashMap<String, TensorShape>) -> Option<TensorShape> {
    if output != 0 {
        return None;
    }
    let input = |pos: usize| node.input(pos).and_then(|name| shapes.get(name));
    match node.op_type.as_str() {
        "Relu" | "Sigmoid" | "Tanh" | "Identity" | "Softmax" | "LayerNormalization" => {
            input(0).cloned()
        }
        "Add" | "Sub" | "Mul" | "Div" => broadcast(input(0)?, input(1)?),
        _ => None,
    }
}

/// Multidirectional broadcast over symbolic dims. Two differing dims only
/// combine when one of them is the literal `1`.
pub fn broadcast(a: &TensorShape, b: &TensorShape) -> Option<TensorShape> {
    // Dim of `s` at position `i` of the right-aligned `rank`-wide result.
    fn aligned(s: &TensorShape, rank: usize, i: usize) -> Option<&Dim> {
        (i + s.rank()).checked_sub(rank).and_then(|j| s.dim(j))
    }

    let rank = a.rank().max(b.rank());
    let mut dims = Vec::with_capacity(rank);
    for i in 0..rank {
        let d = match (aligned(a, rank, i), aligned(b, rank, i)) {
            (Some(x), None) | (None, Some(x)) => x.clone(),
            (Some(x), Some(y)) if x == y => x.clone(),
            (Some(Dim::Value(1)), Some(y)) => y.clone(),
            (Some(x), Some(Dim::Value(1))) => x.clone(),
            _ => return None,
        };
        dims.push(d);
    }
    Some(TensorShape::new(dims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_ir::{NodeArg, TensorProto};
    use tensor_core::DType;

    fn shape(dims: Vec<Dim>) -> Option<TensorShape> {
        Some(TensorShape::new(dims))
    }

    fn graph(input_shape: Option<TensorShape>) -> Graph<Validated> {
        let mut g = Graph::new("g").with_opset("", 17);
        g.add_input(NodeArg::new("x", input_shape, Some(DType::F32)));
        g.add_initializer(TensorProto::from_f32("b", vec![4], vec![0.0; 4]));
        g.add_output(NodeArg::new("y", None, None));
        g.add_node(Node::new(0, "relu", "Relu").with_inputs(["x"]).with_outputs(["t"]));
        g.add_node(Node::new(1, "add", "Add").with_inputs(["t", "b"]).with_outputs(["u"]));
        g.add_node(Node::new(2, "mm", "MatMul").with_inputs(["u", "u"]).with_outputs(["y"]));
        g.validate().unwrap()
    }

    #[test]
    fn test_propagates_through_preserving_ops() {
        let g = graph(shape(vec!["batch".into(), 4.into()]));
        let ctx = ShapeExprContext::new();
        DeclaredShapeInference::new().infer(&g, &ctx).unwrap();

        let expected = TensorShape::new(vec!["batch".into(), 4.into()]);
        assert_eq!(ctx.get("t"), Some(expected.clone()));
        assert_eq!(ctx.get("u"), Some(expected));
        assert_eq!(ctx.get("b"), Some(TensorShape::from_concrete(&[4])));
        assert_eq!(ctx.get("y"), None);
    }

    #[test]
    fn test_missing_input_shape_fails() {
        let g = graph(None);
        let ctx = ShapeExprContext::new();
        let err = DeclaredShapeInference::new().infer(&g, &ctx).unwrap_err();
        assert!(matches!(err, ProviderError::ShapeInferenceFailed(_)));
    }

    #[test]
    fn test_initializer_rank_conflict_fails() {
        let mut g = Graph::new("g").with_opset("", 17);
        g.add_value_info(NodeArg::new("w", shape(vec![2.into(), 2.into()]), None));
        g.add_initializer(TensorProto::from_f32("w", vec![4], vec![0.0; 4]));
        g.add_output(NodeArg::new("w", None, None));
        let g = g.validate().unwrap();

        let ctx = ShapeExprContext::new();
        assert!(DeclaredShapeInference::new().infer(&g, &ctx).is_err());
    }

    #[test]
    fn test_declared_output_wins() {
        let mut g = Graph::new("g").with_opset("", 17);
        g.add_input(NodeArg::new("x", shape(vec![2.into()]), None));
        g.add_output(NodeArg::new("y", shape(vec![Dim::Unknown]), None));
        g.add_node(Node::new(0, "r", "Relu").with_inputs(["x"]).with_outputs(["y"]));
        let g = g.validate().unwrap();

        let ctx = ShapeExprContext::new();
        DeclaredShapeInference::new().infer(&g, &ctx).unwrap();
        assert_eq!(ctx.get("y"), shape(vec![Dim::Unknown]));
    }

    #[test]
    fn test_infer_merges_into_context() {
        let ctx = ShapeExprContext::new();
        ctx.insert("earlier", TensorShape::from_concrete(&[1]));
        let shared = ctx.clone();

        let g = graph(shape(vec![4.into()]));
        DeclaredShapeInference::new().infer(&g, &ctx).unwrap();
        assert_eq!(shared.get("earlier"), Some(TensorShape::from_concrete(&[1])));
        assert!(shared.get("t").is_some());
    }

    #[test]
    fn test_subset_is_independent() {
        let ctx = ShapeExprContext::new();
        ctx.insert("a", TensorShape::from_concrete(&[1]));
        ctx.insert("b", TensorShape::from_concrete(&[2]));

        let sub = ctx.subset(["a", "missing"]);
        assert_eq!(sub.len(), 1);
        assert_eq!(sub.get("a"), Some(TensorShape::from_concrete(&[1])));

        ctx.insert("a", TensorShape::from_concrete(&[9]));
        assert_eq!(sub.get("a"), Some(TensorShape::from_concrete(&[1])));
    }

    #[test]
    fn test_broadcast() {
        let a = TensorShape::new(vec!["n".into(), 1.into(), 4.into()]);
        let b = TensorShape::new(vec![3.into(), 4.into()]);
        assert_eq!(
            broadcast(&a, &b),
            Some(TensorShape::new(vec!["n".into(), 3.into(), 4.into()]))
        );

        let c = TensorShape::new(vec!["m".into()]);
        let d = TensorShape::new(vec![4.into()]);
        assert_eq!(broadcast(&c, &d), None);
    }
}
