// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # model-ir
//!
//! A lightweight view of an operator graph, as handed to an execution
//! provider by the host runtime.
//!
//! - [`Node`]: one operator application: type, domain, opset version,
//!   attributes, and named input/output tensors.
//! - [`NodeArg`]: per-tensor metadata (inferred [`tensor_core::TensorShape`]
//!   and element type).
//! - [`TensorProto`]: a serialized initializer.
//! - [`Graph`]: nodes plus initializers, graph inputs/outputs and imported
//!   opsets, with a **type-state pattern** (`Loaded` → `Validated`).
//! - [`GraphLoader`] / [`GraphManifest`]: load graphs from JSON manifests.
//!
//! # Example
//! ```no_run
//! use model_ir::GraphLoader;
//! use std::path::Path;
//!
//! let graph = GraphLoader::load(Path::new("./graphs/mlp.json")).unwrap();
//! println!("{}", graph.summary());
//! for &i in graph.topological_order() {
//!     println!("  {}", graph.nodes()[i].summary());
//! }
//! ```

mod error;
pub mod graph;
mod initializer;
mod loader;
mod manifest;
mod node;

pub use error::ModelError;
pub use graph::{Graph, Loaded, Validated};
pub use initializer::TensorProto;
pub use loader::GraphLoader;
pub use manifest::{GraphManifest, ManifestNode};
pub use node::{Attribute, Node, NodeArg, DEFAULT_DOMAIN};
