// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for graph loading and IR construction.

/// Errors that can occur when working with graph representations.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The graph manifest file could not be read.
    #[error("failed to read manifest: {0}")]
    ManifestReadError(#[from] std::io::Error),

    /// The manifest JSON is malformed.
    #[error("failed to parse manifest: {0}")]
    ManifestParseError(#[from] serde_json::Error),

    /// A node definition is invalid (e.g., an input with no producer).
    #[error("invalid node '{node}': {detail}")]
    InvalidNode { node: String, detail: String },

    /// The graph contains a cycle or is otherwise malformed.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),
}
