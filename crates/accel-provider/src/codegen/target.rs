// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Code generation targets.

use crate::ProviderError;
use std::fmt;

/// Instruction set the backend generates code for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum CodegenTarget {
    /// Portable stack VM; no native vector units.
    StackVm,
    /// Generic LLVM x86 with 128-bit vectors.
    Llvm,
    Avx2,
    Avx512,
}

impl CodegenTarget {
    /// Parses a configured target name.
    ///
    /// `"llvm"` inspects the host CPU: AVX-512F, then AVX2, then generic.
    pub fn from_name(name: &str) -> Result<Self, ProviderError> {
        match name.to_lowercase().as_str() {
            "stackvm" => Ok(Self::StackVm),
            "llvm" => Ok(Self::detect_host()),
            "avx2" => Ok(Self::Avx2),
            "avx512" => Ok(Self::Avx512),
            other => Err(ProviderError::unimplemented(format!(
                "target '{other}', should be one of stackvm/llvm/avx2/avx512"
            ))),
        }
    }

    /// Best LLVM target for the running CPU.
    pub fn detect_host() -> Self {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            if std::arch::is_x86_feature_detected!("avx512f") {
                return Self::Avx512;
            }
            if std::arch::is_x86_feature_detected!("avx2") {
                return Self::Avx2;
            }
        }
        Self::Llvm
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::StackVm => "stackvm",
            Self::Llvm => "llvm",
            Self::Avx2 => "avx2",
            Self::Avx512 => "avx512",
        }
    }

    /// Width of the target's vector registers in bits.
    pub fn native_vector_bits(self) -> usize {
        match self {
            Self::StackVm | Self::Llvm => 128,
            Self::Avx2 => 256,
            Self::Avx512 => 512,
        }
    }

    /// Lanes per vector for elements of `element_bits` bits.
    pub fn natural_vector_width(self, element_bits: usize) -> usize {
        if element_bits == 0 {
            return 1;
        }
        (self.native_vector_bits() / element_bits).max(1)
    }
}

impl fmt::Display for CodegenTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
