// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `accel kernels` command: list the built-in kernel registry.

use super::banner;
use accel_provider::{CodegenTarget, KernelRegistry};

pub async fn execute() -> anyhow::Result<()> {
    banner("accel · Kernel Registry");

    let host = CodegenTarget::detect_host();
    println!(
        "  Host target: {host} ({} lanes of f32)",
        host.natural_vector_width(32)
    );
    println!();

    let registry = KernelRegistry::builtin();
    println!("  {:<22} {:<10} {:<12}", "Op", "Domain", "Opsets");
    println!("  {}", "-".repeat(46));
    for kernel in registry.iter() {
        let domain = if kernel.domain.is_empty() { "ai.onnx" } else { &kernel.domain };
        println!(
            "  {:<22} {:<10} {:<12}",
            kernel.op_type,
            domain,
            kernel.version_range()
        );
    }
    println!();
    println!("  {} kernels", registry.len());
    Ok(())
}
