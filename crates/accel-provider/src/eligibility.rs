// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-node eligibility predicate.
//!
//! A node is eligible when:
//!
//! 1. every input and output has an inferred shape whose dims are all
//!    positive values or named parameters;
//! 2. the kernel registry has a kernel for it;
//! 3. a `Tile` reads its `repeats` from a constant initializer;
//! 4. a `Slice` has constant `starts`/`ends`/`axes` and no `steps` (tensor
//!    form) and concrete dims on every sliced axis (both forms).

use crate::initializers::decode_ints;
use crate::KernelRegistry;
use model_ir::{Attribute, Graph, Node, Validated};
use std::collections::HashMap;
use tensor_core::TensorShape;

/// Decides which nodes the provider may claim.
///
/// Holds a frozen copy of the inferred shapes so repeated queries are
/// cheap and never observe a concurrent inference run.
pub struct Eligibility<'a> {
    graph: &'a Graph<Validated>,
    shapes: HashMap<String, TensorShape>,
    registry: &'a KernelRegistry,
    provider: &'a str,
}

impl<'a> Eligibility<'a> {
    pub fn new(
        graph: &'a Graph<Validated>,
        shapes: HashMap<String, TensorShape>,
        registry: &'a KernelRegistry,
        provider: &'a str,
    ) -> Self {
        Self {
            graph,
            shapes,
            registry,
            provider,
        }
    }

    pub fn is_supported(&self, node: &Node) -> bool {
        if let Some(tensor) = node.tensors().find(|t| !self.is_fully_shaped(t)) {
            tracing::debug!("{}: tensor '{tensor}' is not fully shaped", node.name);
            return false;
        }

        if self.registry.find_kernel(node, self.provider).is_none() {
            tracing::debug!(
                "{}: no kernel for {} v{}",
                node.name,
                node.op_type,
                node.since_version
            );
            return false;
        }

        match node.op_type.as_str() {
            "Tile" => self.tile_supported(node),
            "Slice" => self.slice_supported(node),
            _ => true,
        }
    }

    fn is_fully_shaped(&self, tensor: &str) -> bool {
        self.shapes
            .get(tensor)
            .is_some_and(TensorShape::is_fully_defined)
    }

    fn is_constant(&self, name: Option<&str>) -> bool {
        name.is_some_and(|n| self.graph.is_constant_initializer(n))
    }

    fn tile_supported(&self, node: &Node) -> bool {
        let ok = self.is_constant(node.input(1));
        if !ok {
            tracing::debug!("{}: Tile with dynamic repeats", node.name);
        }
        ok
    }

    fn slice_supported(&self, node: &Node) -> bool {
        let mut axes: Vec<i64> = Vec::new();

        if node.inputs.len() > 1 {
            // starts, ends, axes and steps are inputs.
            let starts_dynamic = !self.is_constant(node.input(1));
            let ends_dynamic = !self.is_constant(node.input(2));
            let axes_dynamic = node.input(3).is_some() && !self.is_constant(node.input(3));
            let has_steps = node.input(4).is_some();
            if starts_dynamic || ends_dynamic || axes_dynamic || has_steps {
                tracing::debug!("{}: Slice with dynamic parameters or steps", node.name);
                return false;
            }

            if let Some(proto) = node.input(3).and_then(|n| self.graph.initializer(n)) {
                match decode_ints(proto) {
                    Ok(decoded) => axes = decoded,
                    Err(e) => {
                        tracing::debug!("{}: unreadable Slice axes: {e}", node.name);
                        return false;
                    }
                }
            }
        } else if let Some(list) = node.attribute("axes").and_then(Attribute::as_ints) {
            axes = list.to_vec();
        }

        let ok = node
            .input(0)
            .and_then(|data| self.shapes.get(data))
            .is_some_and(|shape| concrete_on_axes(shape, &axes));
        if !ok {
            tracing::debug!("{}: Slice over a symbolic dimension", node.name);
        }
        ok
    }
}

/// `true` if every addressed dim is a concrete value. An empty axis list
/// addresses all dims; an out-of-range axis is never concrete.
fn concrete_on_axes(shape: &TensorShape, axes: &[i64]) -> bool {
    if axes.is_empty() {
        return shape.dims().iter().all(|d| d.is_concrete());
    }
    let rank = shape.rank() as i64;
    axes.iter().all(|&axis| {
        let a = if axis < 0 { axis + rank } else { axis };
        (0..rank).contains(&a) && shape.dim(a as usize).is_some_and(|d| d.is_concrete())
    })
}
