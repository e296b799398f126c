// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Provider configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! target = "llvm"
//! memory_limit = "1G"
//! strategy = "connected-components"
//! enable_per_node_parallel = false
//! allow_unaligned_buffers = false
//! device_id = 0
//! ```

use crate::{CodegenTarget, ProviderError};
use memory_manager::MemoryBudget;
use partition_planner::PartitionStrategy;
use std::path::Path;

/// Configuration for one [`AccelProvider`](crate::AccelProvider) instance.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Code generation target: `"stackvm"`, `"llvm"`, `"avx2"` or `"avx512"`.
    pub target: String,
    /// Budget of the default allocator (human-readable, e.g. `"512M"`).
    pub memory_limit: String,
    /// Partition strategy name: `"connected-components"` or `"single-node"`.
    pub strategy: String,
    /// Lets the backend schedule independent nodes of a region in parallel.
    pub enable_per_node_parallel: bool,
    /// Accept input buffers without the target's preferred alignment.
    pub allow_unaligned_buffers: bool,
    /// Device whose default allocator backs constants and kernels.
    pub device_id: i32,
}

impl ProviderConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ProviderError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ProviderError> {
        toml::from_str(toml_str)
            .map_err(|e| ProviderError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, ProviderError> {
        toml::to_string_pretty(self)
            .map_err(|e| ProviderError::Config(format!("TOML serialise error: {e}")))
    }

    /// Parses the memory limit into a [`MemoryBudget`].
    pub fn parse_budget(&self) -> Result<MemoryBudget, ProviderError> {
        MemoryBudget::parse(&self.memory_limit)
            .map_err(|e| ProviderError::Config(format!("invalid memory limit: {e}")))
    }

    /// Creates the partition strategy named by this config.
    pub fn create_strategy(&self) -> Result<Box<dyn PartitionStrategy>, ProviderError> {
        partition_planner::strategy::from_name(&self.strategy.to_lowercase())
            .map_err(|e| ProviderError::Config(e.to_string()))
    }

    /// Resolves the code generation target, probing the host CPU for `"llvm"`.
    ///
    /// # Errors
    /// Unknown target names yield [`ProviderError::Unimplemented`].
    pub fn create_target(&self) -> Result<CodegenTarget, ProviderError> {
        CodegenTarget::from_name(&self.target)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            target: "llvm".to_string(),
            memory_limit: "1G".to_string(),
            strategy: "connected-components".to_string(),
            enable_per_node_parallel: false,
            allow_unaligned_buffers: false,
            device_id: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let c = ProviderConfig::default();
        assert_eq!(c.target, "llvm");
        assert_eq!(c.memory_limit, "1G");
        assert_eq!(c.strategy, "connected-components");
        assert!(!c.enable_per_node_parallel);
    }

    #[test]
    fn test_parse_budget() {
        let c = ProviderConfig {
            memory_limit: "256M".into(),
            ..Default::default()
        };
        assert_eq!(c.parse_budget().unwrap().as_mb(), 256);

        let bad = ProviderConfig {
            memory_limit: "lots".into(),
            ..Default::default()
        };
        assert!(matches!(bad.parse_budget(), Err(ProviderError::Config(_))));
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
target = "stackvm"
strategy = "single-node"
device_id = 1
"#;
        let c = ProviderConfig::from_toml(toml).unwrap();
        assert_eq!(c.target, "stackvm");
        assert_eq!(c.strategy, "single-node");
        assert_eq!(c.device_id, 1);
        assert_eq!(c.memory_limit, "1G");
    }

    #[test]
    fn test_from_toml_invalid() {
        assert!(matches!(
            ProviderConfig::from_toml("device_id = \"zero\""),
            Err(ProviderError::Config(_))
        ));
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let c = ProviderConfig {
            target: "avx2".into(),
            enable_per_node_parallel: true,
            ..Default::default()
        };
        let toml = c.to_toml().unwrap();
        let back = ProviderConfig::from_toml(&toml).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join("accel_provider_config_test.toml");
        std::fs::write(&path, "memory_limit = \"64M\"\n").unwrap();
        let c = ProviderConfig::from_file(&path).unwrap();
        assert_eq!(c.parse_budget().unwrap().as_mb(), 64);
        let _ = std::fs::remove_file(&path);

        assert!(ProviderConfig::from_file(Path::new("/nonexistent/accel.toml")).is_err());
    }

    #[test]
    fn test_create_strategy() {
        let c = ProviderConfig {
            strategy: "Single-Node".into(),
            ..Default::default()
        };
        assert_eq!(c.create_strategy().unwrap().name(), "single-node");

        let bad = ProviderConfig {
            strategy: "greedy".into(),
            ..Default::default()
        };
        assert!(matches!(bad.create_strategy(), Err(ProviderError::Config(_))));
    }

    #[test]
    fn test_create_target() {
        let c = ProviderConfig {
            target: "avx512".into(),
            ..Default::default()
        };
        assert_eq!(c.create_target().unwrap(), CodegenTarget::Avx512);

        let bad = ProviderConfig {
            target: "cuda".into(),
            ..Default::default()
        };
        assert!(matches!(
            bad.create_target(),
            Err(ProviderError::Unimplemented { .. })
        ));
    }
}
