// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # accel
//!
//! Command-line interface for the accelerating execution provider.
//!
//! ## Usage
//! ```bash
//! # Show the graph and its inferred shapes
//! accel inspect --graph ./models/mlp.json
//!
//! # Show which regions the provider claims
//! accel partition --graph ./models/mlp.json --strategy single-node --json
//!
//! # Compile lazily and run with 4 concurrent requests
//! accel run --graph ./models/mlp.json --dim batch=8 --requests 4
//!
//! # List the kernels the provider can compile
//! accel kernels
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "accel",
    about = "Graph partitioning and lazy compilation for an accelerating execution provider",
    version,
    author
)]
struct Cli {
    /// Path to a provider TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the graph, its opsets and inferred tensor shapes.
    Inspect {
        /// Path to the JSON graph manifest.
        #[arg(short, long)]
        graph: PathBuf,
    },

    /// Print the regions the provider claims.
    Partition {
        #[arg(short, long)]
        graph: PathBuf,

        /// Partition strategy: connected-components, single-node.
        #[arg(short, long)]
        strategy: Option<String>,

        /// Code generation target: stackvm, llvm, avx2, avx512.
        #[arg(short, long)]
        target: Option<String>,

        /// Emit the regions as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Claim, compile and execute a fully claimed graph.
    Run {
        #[arg(short, long)]
        graph: PathBuf,

        /// JSON file mapping input names to `{ "shape": [...], "data": [...] }`.
        #[arg(short, long)]
        inputs: Option<PathBuf>,

        /// Symbolic dimension sizes for generated inputs (e.g. `batch=8`).
        #[arg(short, long = "dim", value_parser = commands::run::parse_dim)]
        dims: Vec<(String, usize)>,

        /// Number of concurrent requests sharing the compiled units.
        #[arg(short, long, default_value_t = 1)]
        requests: usize,

        #[arg(short, long)]
        target: Option<String>,
    },

    /// List the kernels the provider can compile.
    Kernels,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Inspect { graph } => commands::inspect::execute(graph).await,
        Commands::Partition {
            graph,
            strategy,
            target,
            json,
        } => commands::partition::execute(graph, cli.config, strategy, target, json).await,
        Commands::Run {
            graph,
            inputs,
            dims,
            requests,
            target,
        } => commands::run::execute(graph, cli.config, inputs, dims, requests, target).await,
        Commands::Kernels => commands::kernels::execute().await,
    }
}
