// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! JSON graph manifest parsing.
//!
//! The manifest describes a graph in a compact JSON form that mirrors the
//! fields of an ONNX `GraphProto`.
//!
//! # Format
//! ```json
//! {
//!   "name": "mlp",
//!   "opset_import": { "": 13 },
//!   "inputs":  [{ "name": "x", "dtype": "f32", "shape": ["batch", 4] }],
//!   "outputs": [{ "name": "y" }],
//!   "value_info": [],
//!   "initializers": [
//!     { "name": "w", "dims": [4, 4], "data_type": 1, "float_data": [ ... ] }
//!   ],
//!   "nodes": [
//!     { "name": "mm", "op_type": "MatMul", "inputs": ["x", "w"], "outputs": ["h"] },
//!     { "name": "act", "op_type": "Relu", "inputs": ["h"], "outputs": ["y"] }
//!   ]
//! }
//! ```
//!
//! Node positions in `nodes` become node indices.

use crate::{Attribute, ModelError, NodeArg, TensorProto};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Top-level graph manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GraphManifest {
    pub name: String,
    /// Imported opset per domain.
    pub opset_import: BTreeMap<String, i64>,
    #[serde(default)]
    pub inputs: Vec<NodeArg>,
    #[serde(default)]
    pub outputs: Vec<NodeArg>,
    /// Metadata for intermediate tensors.
    #[serde(default)]
    pub value_info: Vec<NodeArg>,
    #[serde(default)]
    pub initializers: Vec<TensorProto>,
    pub nodes: Vec<ManifestNode>,
}

/// A single node entry in the manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ManifestNode {
    #[serde(default)]
    pub name: String,
    pub op_type: String,
    #[serde(default)]
    pub domain: String,
    /// Defaults to the imported opset of `domain`.
    #[serde(default)]
    pub since_version: Option<i64>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
    #[serde(default)]
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl GraphManifest {
    /// Loads a manifest from a JSON file path.
    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path)?;
        let manifest: Self = serde_json::from_str(&content)?;
        Ok(manifest)
    }

    /// Parses a manifest from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let manifest: Self = serde_json::from_str(json)?;
        Ok(manifest)
    }

    /// Validates manifest-level consistency.
    ///
    /// Checks:
    /// - The default domain is imported.
    /// - No duplicate initializer or graph input names.
    /// - Every node has at least one output.
    ///
    /// Graph wiring (producers, cycles) is checked by
    /// [`crate::Graph::validate`] after conversion.
    pub fn validate(&self) -> Result<(), ModelError> {
        if !self.opset_import.contains_key("") {
            return Err(ModelError::InvalidGraph(
                "manifest does not import the default domain".into(),
            ));
        }

        let mut seen = HashSet::new();
        for init in &self.initializers {
            if !seen.insert(init.name.as_str()) {
                return Err(ModelError::InvalidGraph(format!(
                    "duplicate initializer '{}'",
                    init.name
                )));
            }
        }

        let mut seen_inputs = HashSet::new();
        for input in &self.inputs {
            if !seen_inputs.insert(input.name.as_str()) {
                return Err(ModelError::InvalidGraph(format!(
                    "duplicate graph input '{}'",
                    input.name
                )));
            }
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if node.outputs.iter().all(String::is_empty) {
                return Err(ModelError::InvalidNode {
                    node: display_name(&node.name, i),
                    detail: "node has no outputs".into(),
                });
            }
            if node.name.is_empty() {
                tracing::debug!("node {i} ({}) has no name", node.op_type);
            }
        }

        Ok(())
    }
}

/// Unnamed nodes are referred to by their position.
pub(crate) fn display_name(name: &str, index: usize) -> String {
    if name.is_empty() {
        format!("#{index}")
    } else {
        name.to_string()
    }
}
