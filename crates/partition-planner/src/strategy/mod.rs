// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The [`PartitionStrategy`] trait and strategy implementations.

pub mod connected;
pub mod single;

use crate::{ClaimedRegion, ConnectedComponents, PlannerError, SingleNode};
use model_ir::{Graph, Node, Validated};

/// Trait for partition strategies.
///
/// A strategy takes a validated graph and an eligibility predicate and
/// returns the regions the provider claims. Strategies are purely
/// algorithmic, so they can be tested without a provider.
pub trait PartitionStrategy: Send + Sync {
    /// Human-readable name of this strategy.
    fn name(&self) -> &str;

    /// Groups the eligible nodes of `graph` into regions. Fused node names
    /// are prefixed with `provider`.
    fn partition(
        &self,
        graph: &Graph<Validated>,
        is_supported: &dyn Fn(&Node) -> bool,
        provider: &str,
    ) -> Result<Vec<ClaimedRegion>, PlannerError>;
}

/// Looks up a strategy by its configuration name.
pub fn from_name(name: &str) -> Result<Box<dyn PartitionStrategy>, PlannerError> {
    match name {
        "connected-components" => Ok(Box::new(ConnectedComponents::new())),
        "single-node" => Ok(Box::new(SingleNode::new())),
        other => Err(PlannerError::UnknownStrategy(other.to_string())),
    }
}
