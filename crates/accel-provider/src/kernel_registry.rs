// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operator kernels the provider can compile.
//!
//! A [`KernelDef`] states that a provider implements an operator over a
//! range of opset versions. The built-in table is created once per process
//! by [`KernelRegistry::builtin`].

use model_ir::{Node, DEFAULT_DOMAIN};
use std::sync::OnceLock;

/// Provider type string used for kernel lookup and fused node names.
pub const PROVIDER_TYPE: &str = "AccelExecutionProvider";

/// One registered operator implementation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct KernelDef {
    pub op_type: String,
    pub domain: String,
    pub since_version: i64,
    /// Last supported version, inclusive. `None` means open-ended.
    pub end_version: Option<i64>,
    pub provider: String,
}

impl KernelDef {
    /// Open-ended kernel in the default domain.
    pub fn new(op_type: &str, since_version: i64) -> Self {
        Self {
            op_type: op_type.to_string(),
            domain: DEFAULT_DOMAIN.to_string(),
            since_version,
            end_version: None,
            provider: PROVIDER_TYPE.to_string(),
        }
    }

    /// Kernel covering `since_version..=end_version`.
    pub fn versioned(op_type: &str, since_version: i64, end_version: i64) -> Self {
        Self {
            end_version: Some(end_version),
            ..Self::new(op_type, since_version)
        }
    }

    pub fn covers(&self, version: i64) -> bool {
        version >= self.since_version && self.end_version.map_or(true, |end| version <= end)
    }

    /// Returns e.g. `"[1, 12]"` or `"[9, ∞)"`.
    pub fn version_range(&self) -> String {
        match self.end_version {
            Some(end) => format!("[{}, {end}]", self.since_version),
            None => format!("[{}, ∞)", self.since_version),
        }
    }
}

/// A table of kernel definitions.
#[derive(Debug, Clone, Default)]
pub struct KernelRegistry {
    kernels: Vec<KernelDef>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: KernelDef) {
        self.kernels.push(def);
    }

    /// The process-wide registry of this provider's kernels, built on
    /// first access.
    pub fn builtin() -> &'static KernelRegistry {
        static BUILTIN: OnceLock<KernelRegistry> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            let mut r = KernelRegistry::new();
            for op in ["Add", "Sub", "Mul", "Div"] {
                r.register(KernelDef::new(op, 7));
            }
            for op in ["Relu", "Sigmoid", "Tanh"] {
                r.register(KernelDef::new(op, 6));
            }
            r.register(KernelDef::new("Identity", 1));
            r.register(KernelDef::new("MatMul", 9));
            r.register(KernelDef::versioned("Softmax", 1, 12));
            r.register(KernelDef::new("Softmax", 13));
            r.register(KernelDef::new("LayerNormalization", 17));
            r.register(KernelDef::new("Tile", 6));
            r.register(KernelDef::versioned("Slice", 1, 9));
            r.register(KernelDef::new("Slice", 10));
            for op in ["ReduceSum", "ReduceMean", "ReduceMax"] {
                r.register(KernelDef::versioned(op, 1, 12));
            }
            tracing::debug!("built-in kernel registry: {} kernels", r.len());
            r
        })
    }

    /// Finds the kernel for `node` registered by `provider`.
    ///
    /// Matches domain, operator type and the node's opset version.
    pub fn find_kernel(&self, node: &Node, provider: &str) -> Option<&KernelDef> {
        self.kernels.iter().find(|k| {
            k.provider == provider
                && k.domain == node.domain
                && k.op_type == node.op_type
                && k.covers(node.since_version)
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &KernelDef> {
        self.kernels.iter()
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
}
