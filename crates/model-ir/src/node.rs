// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operator nodes, their attributes, and tensor metadata.
//!
//! A [`Node`] refers to the tensors it reads and writes by name. The
//! metadata for each tensor (inferred shape and element type) lives in a
//! [`NodeArg`] owned by the graph, so producers and consumers share one
//! description.

use std::collections::BTreeMap;
use std::fmt;
use tensor_core::{DType, TensorShape};

/// The default operator domain.
pub const DEFAULT_DOMAIN: &str = "";

/// A node attribute value.
///
/// In JSON an attribute is written as a bare value; integers and integer
/// lists are distinguished from floats by the presence of a fraction.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Attribute {
    Int(i64),
    Float(f32),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
    String(String),
}

impl Attribute {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Attribute::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a float, widening integer attributes.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Attribute::Float(v) => Some(*v),
            Attribute::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    /// Returns the value as an integer list.
    ///
    /// An empty JSON list deserializes as [`Attribute::Ints`], so an empty
    /// float list is also accepted here.
    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            Attribute::Ints(v) => Some(v),
            Attribute::Floats(v) if v.is_empty() => Some(&[]),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Attribute::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Metadata for one named tensor in the graph.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NodeArg {
    pub name: String,
    /// Declared or inferred shape; `None` if nothing is known.
    #[serde(default)]
    pub shape: Option<TensorShape>,
    #[serde(default)]
    pub dtype: Option<DType>,
}

impl NodeArg {
    pub fn new(name: impl Into<String>, shape: Option<TensorShape>, dtype: Option<DType>) -> Self {
        Self {
            name: name.into(),
            shape,
            dtype,
        }
    }
}

/// A single operator application.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    /// Position of the node in the graph (0-based).
    pub index: usize,
    pub name: String,
    pub op_type: String,
    /// Operator domain; the empty string is the default domain.
    #[serde(default)]
    pub domain: String,
    /// Opset version this node was defined against. Zero means "take the
    /// graph's opset for this domain", which validation resolves.
    #[serde(default)]
    pub since_version: i64,
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
    /// Input tensor names. An empty name marks an omitted optional input.
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl Node {
    /// Creates a default-domain node with no inputs, outputs or attributes.
    pub fn new(index: usize, name: impl Into<String>, op_type: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            op_type: op_type.into(),
            domain: DEFAULT_DOMAIN.to_string(),
            since_version: 0,
            attributes: BTreeMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_inputs<I, T>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_outputs<I, T>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Attribute) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_since_version(mut self, version: i64) -> Self {
        self.since_version = version;
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Attribute> {
        self.attributes.get(key)
    }

    /// Returns the input at `position` unless it is absent or omitted.
    pub fn input(&self, position: usize) -> Option<&str> {
        self.inputs
            .get(position)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Iterates over the present (non-omitted) inputs.
    pub fn present_inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs
            .iter()
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Iterates over every input and output tensor name, skipping omitted ones.
    pub fn tensors(&self) -> impl Iterator<Item = &str> {
        self.present_inputs().chain(
            self.outputs
                .iter()
                .map(String::as_str)
                .filter(|n| !n.is_empty()),
        )
    }

    /// Returns a one-line description for logs and the CLI.
    pub fn summary(&self) -> String {
        let domain = if self.domain.is_empty() {
            "ai.onnx"
        } else {
            &self.domain
        };
        format!(
            "[{}] {} ({}:{} v{}) {} -> {}",
            self.index,
            self.name,
            domain,
            self.op_type,
            self.since_version,
            self.inputs.join(","),
            self.outputs.join(","),
        )
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_json_forms() {
        let attrs: BTreeMap<String, Attribute> =
            serde_json::from_str(r#"{"axis": -1, "epsilon": 1e-5, "axes": [0, 2], "mode": "constant"}"#)
                .unwrap();
        assert_eq!(attrs["axis"].as_int(), Some(-1));
        assert!((attrs["epsilon"].as_float().unwrap() - 1e-5).abs() < 1e-9);
        assert_eq!(attrs["axes"].as_ints(), Some(&[0, 2][..]));
        assert_eq!(attrs["mode"].as_str(), Some("constant"));
    }

    #[test]
    fn test_omitted_inputs_skipped() {
        let node = Node::new(0, "slice", "Slice").with_inputs(["x", "s", "e", "", "st"]);
        assert_eq!(node.input(3), None);
        assert_eq!(node.input(4), Some("st"));
        assert_eq!(node.present_inputs().count(), 4);
    }

    #[test]
    fn test_summary_names_default_domain() {
        let node = Node::new(2, "r", "Relu")
            .with_inputs(["a"])
            .with_outputs(["b"])
            .with_since_version(14);
        assert_eq!(node.summary(), "[2] r (ai.onnx:Relu v14) a -> b");
    }
}
