// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Inferred tensor shapes with symbolic dimensions.
//!
//! Shape inference resolves each graph tensor to a [`TensorShape`]: an
//! ordered list of [`Dim`]s, each a concrete size, a named parameter bound
//! only at execution time (e.g. `"batch"`), or unknown.
//!
//! In JSON a dimension is written as an integer, a string, or `null`:
//!
//! ```text
//! ["batch", 128, null]
//! ```

use crate::Shape;
use std::fmt;

/// One dimension of an inferred shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Dim {
    /// A concrete size. Zero and negative values are representable but
    /// never considered fully defined.
    Value(i64),
    /// A named symbolic dimension.
    Param(String),
    /// Present but unresolved.
    Unknown,
}

impl Dim {
    /// A dimension is fully defined if it is a positive concrete value or a
    /// named parameter.
    pub fn is_fully_defined(&self) -> bool {
        match self {
            Dim::Value(v) => *v > 0,
            Dim::Param(name) => !name.is_empty(),
            Dim::Unknown => false,
        }
    }

    /// Returns the concrete size if this dimension has one.
    pub fn value(&self) -> Option<i64> {
        match self {
            Dim::Value(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns `true` if this is a concrete value (of any sign).
    pub fn is_concrete(&self) -> bool {
        matches!(self, Dim::Value(_))
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Value(v) => write!(f, "{v}"),
            Dim::Param(name) => f.write_str(name),
            Dim::Unknown => f.write_str("?"),
        }
    }
}

impl From<i64> for Dim {
    fn from(v: i64) -> Self {
        Dim::Value(v)
    }
}

impl From<&str> for Dim {
    fn from(name: &str) -> Self {
        Dim::Param(name.to_string())
    }
}

/// An inferred shape: concrete, symbolic or unknown per dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TensorShape {
    dims: Vec<Dim>,
}

impl TensorShape {
    pub fn new(dims: Vec<Dim>) -> Self {
        Self { dims }
    }

    /// Builds a fully concrete shape.
    pub fn from_concrete(dims: &[usize]) -> Self {
        Self {
            dims: dims.iter().map(|&d| Dim::Value(d as i64)).collect(),
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    pub fn dim(&self, index: usize) -> Option<&Dim> {
        self.dims.get(index)
    }

    /// Returns `true` if every dimension is fully defined.
    ///
    /// A rank-0 shape (scalar) is trivially fully defined.
    pub fn is_fully_defined(&self) -> bool {
        self.dims.iter().all(Dim::is_fully_defined)
    }

    /// Returns `true` if every dimension is a concrete value.
    pub fn is_static(&self) -> bool {
        self.dims.iter().all(Dim::is_concrete)
    }

    /// Converts to a concrete [`Shape`] when every dimension is a
    /// non-negative value.
    pub fn to_concrete(&self) -> Option<Shape> {
        self.dims
            .iter()
            .map(|d| match d {
                Dim::Value(v) if *v >= 0 => Some(*v as usize),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(Shape::new)
    }

    /// Returns the distinct symbolic parameter names, in order of appearance.
    pub fn params(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for d in &self.dims {
            if let Dim::Param(name) = d {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<Dim>> for TensorShape {
    fn from(dims: Vec<Dim>) -> Self {
        Self::new(dims)
    }
}

impl From<&Shape> for TensorShape {
    fn from(shape: &Shape) -> Self {
        Self::from_concrete(shape.dims())
    }
}
