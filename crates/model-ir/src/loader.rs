// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph loading from a JSON manifest.
//!
//! The loader parses a [`GraphManifest`], converts it into a
//! [`Graph<Loaded>`](crate::Graph) and validates it. Initializer payloads
//! stay in their serialized [`crate::TensorProto`] form; decoding into
//! native buffers is left to whoever captures them.

use crate::manifest::display_name;
use crate::{graph, Graph, GraphManifest, ModelError, Node};
use std::path::Path;

/// Loads a graph from disk into a validated [`Graph`].
///
/// # Example
/// ```no_run
/// use model_ir::GraphLoader;
/// use std::path::Path;
///
/// let graph = GraphLoader::load(Path::new("./graphs/mlp.json")).unwrap();
/// println!("Loaded {} nodes", graph.num_nodes());
/// ```
pub struct GraphLoader;

impl GraphLoader {
    /// Loads and validates a graph from a manifest file.
    ///
    /// Steps:
    /// 1. Parse the manifest and validate it.
    /// 2. Convert manifest entries into a [`Graph<Loaded>`](crate::Graph).
    /// 3. Validate the graph wiring.
    pub fn load(path: &Path) -> Result<Graph<graph::Validated>, ModelError> {
        let manifest = GraphManifest::from_file(path)?;
        tracing::info!("loading graph '{}' from {}", manifest.name, path.display());
        Self::from_manifest(&manifest)
    }

    /// Loads a graph from a manifest JSON string.
    pub fn from_json(json: &str) -> Result<Graph<graph::Validated>, ModelError> {
        let manifest = GraphManifest::from_json(json)?;
        Self::from_manifest(&manifest)
    }

    /// Builds and validates a graph from an already parsed manifest.
    pub fn from_manifest(manifest: &GraphManifest) -> Result<Graph<graph::Validated>, ModelError> {
        manifest.validate()?;
        Self::build_graph(manifest).validate()
    }

    fn build_graph(manifest: &GraphManifest) -> Graph<graph::Loaded> {
        let mut graph = Graph::new(manifest.name.clone());
        for (domain, &version) in &manifest.opset_import {
            graph = graph.with_opset(domain.clone(), version);
        }
        for init in &manifest.initializers {
            graph.add_initializer(init.clone());
        }
        for input in &manifest.inputs {
            graph.add_input(input.clone());
        }
        for info in &manifest.value_info {
            graph.add_value_info(info.clone());
        }
        for output in &manifest.outputs {
            graph.add_output(output.clone());
        }

        for (i, mn) in manifest.nodes.iter().enumerate() {
            let mut node = Node::new(i, display_name(&mn.name, i), mn.op_type.clone())
                .with_domain(mn.domain.clone())
                .with_inputs(mn.inputs.iter().cloned())
                .with_outputs(mn.outputs.iter().cloned());
            node.attributes = mn.attributes.clone();
            if let Some(v) = mn.since_version {
                node = node.with_since_version(v);
            }
            graph.add_node(node);
        }

        graph
    }
}
