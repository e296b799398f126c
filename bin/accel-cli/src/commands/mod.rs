// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommand implementations and shared helpers.

pub mod inspect;
pub mod kernels;
pub mod partition;
pub mod run;

use accel_provider::ProviderConfig;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose > 1)
        .init();
}

/// Loads the provider configuration and applies command-line overrides.
pub fn load_config(
    path: Option<PathBuf>,
    strategy: Option<String>,
    target: Option<String>,
) -> anyhow::Result<ProviderConfig> {
    let mut config = match path {
        Some(p) => ProviderConfig::from_file(&p)?,
        None => ProviderConfig::default(),
    };
    if let Some(s) = strategy {
        config.strategy = s;
    }
    if let Some(t) = target {
        config.target = t;
    }
    Ok(config)
}

pub fn load_graph(path: &Path) -> anyhow::Result<model_ir::Graph<model_ir::Validated>> {
    model_ir::GraphLoader::load(path)
        .map_err(|e| anyhow::anyhow!("failed to load graph from '{}': {e}", path.display()))
}

pub fn banner(title: &str) {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║ {:^52} ║", title);
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
}

/// Truncates a string to `max_len` with ellipsis if needed.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
