// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Allocator lookup keyed by device and memory type.

use crate::{MemoryBudget, MemoryPool};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Role of the memory an allocator hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemType {
    /// Device-local working memory.
    Default,
    /// Host memory visible to the device for inputs.
    CpuInput,
    /// Host memory visible to the device for outputs.
    CpuOutput,
}

impl fmt::Display for MemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemType::Default => write!(f, "default"),
            MemType::CpuInput => write!(f, "cpu_input"),
            MemType::CpuOutput => write!(f, "cpu_output"),
        }
    }
}

/// Describes which allocator a buffer came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub name: String,
    pub device_id: i32,
    pub mem_type: MemType,
}

impl MemoryInfo {
    pub fn new(name: impl Into<String>, device_id: i32, mem_type: MemType) -> Self {
        Self {
            name: name.into(),
            device_id,
            mem_type,
        }
    }

    /// Default-memory CPU allocator for `device_id`.
    pub fn cpu(device_id: i32) -> Self {
        Self::new("Cpu", device_id, MemType::Default)
    }
}

/// Process-side table of allocators, one per `(device_id, MemType)`.
///
/// Missing entries are created on first lookup with the registry's
/// default budget.
pub struct AllocatorRegistry {
    default_budget: MemoryBudget,
    pools: Mutex<HashMap<(i32, MemType), Arc<MemoryPool>>>,
}

impl AllocatorRegistry {
    pub fn new(default_budget: MemoryBudget) -> Self {
        Self {
            default_budget,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the allocator for `(device_id, mem_type)`, creating it if needed.
    pub fn get(&self, device_id: i32, mem_type: MemType) -> Arc<MemoryPool> {
        let mut pools = self
            .pools
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let pool = pools.entry((device_id, mem_type)).or_insert_with(|| {
            let name = match mem_type {
                MemType::Default => "Cpu".to_string(),
                other => format!("Cpu_{other}"),
            };
            tracing::debug!(
                "creating allocator '{name}' for device {device_id} ({})",
                self.default_budget
            );
            Arc::new(MemoryPool::with_info(
                MemoryInfo::new(name, device_id, mem_type),
                self.default_budget,
            ))
        });
        Arc::clone(pool)
    }

    /// Installs `pool` under its own `MemoryInfo` key, replacing any
    /// previous entry. Returns the replaced allocator.
    pub fn register(&self, pool: Arc<MemoryPool>) -> Option<Arc<MemoryPool>> {
        let key = (pool.info().device_id, pool.info().mem_type);
        self.pools
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, pool)
    }

    pub fn len(&self) -> usize {
        self.pools
            .lock()
            .map(|p| p.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn default_budget(&self) -> MemoryBudget {
        self.default_budget
    }
}

impl fmt::Debug for AllocatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocatorRegistry")
            .field("default_budget", &self.default_budget)
            .field("allocators", &self.len())
            .finish()
    }
}
