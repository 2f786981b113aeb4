// SPDX-License-Identifier: MIT

//! Agent graph
//!
//! Nodes are wired with static or conditional edges, compiled once, and
//! walked from the entry until a route reaches END.

pub mod builder;
pub mod executor;
pub mod types;

pub use builder::{build_agent_graph, route_from_orchestrator, GraphBuilder};
pub use executor::{CompiledGraph, GraphEvent, Router};
pub use types::{NodeKind, Route};
