// SPDX-License-Identifier: MIT

//! Graph builder - wires nodes and edges into an executable graph

use std::collections::HashMap;
use std::sync::Arc;

use super::executor::{CompiledGraph, Edge, Router};
use super::types::{NodeKind, Route};
use crate::adk::error::CompileError;
use crate::multihop::agents::{
    Coder, Decomposer, FactRecall, FinalAnswer, Node, Orchestrator, ProgressAssessment,
};
use crate::multihop::coder::CodeExecutor;
use crate::multihop::config::AgentSettings;
use crate::multihop::llm::Chat;
use crate::multihop::state::AgentState;

pub const DEFAULT_RECURSION_LIMIT: u32 = 100;

/// Collects nodes and edges, then validates them in [`GraphBuilder::compile`]
pub struct GraphBuilder {
    nodes: HashMap<NodeKind, Arc<dyn Node>>,
    entry: Option<NodeKind>,
    edges: Vec<(NodeKind, Route)>,
    conditional: Vec<(NodeKind, Router)>,
    recursion_limit: u32,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            entry: None,
            edges: Vec::new(),
            conditional: Vec::new(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    /// Register a node under its own kind; re-adding replaces it
    pub fn add_node(mut self, node: Arc<dyn Node>) -> Self {
        self.nodes.insert(node.kind(), node);
        self
    }

    pub fn set_entry(mut self, kind: NodeKind) -> Self {
        self.entry = Some(kind);
        self
    }

    pub fn add_edge(mut self, from: NodeKind, to: impl Into<Route>) -> Self {
        self.edges.push((from, to.into()));
        self
    }

    /// Route out of `from` by inspecting the state after it runs
    pub fn add_conditional_edge<F>(mut self, from: NodeKind, router: F) -> Self
    where
        F: Fn(&AgentState) -> Route + Send + Sync + 'static,
    {
        let router: Router = Arc::new(router);
        self.conditional.push((from, router));
        self
    }

    pub fn recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn compile(self) -> Result<CompiledGraph, CompileError> {
        let GraphBuilder {
            nodes,
            entry,
            edges: static_edges,
            conditional,
            recursion_limit,
        } = self;

        let registered = |kind: NodeKind| -> Result<(), CompileError> {
            if nodes.contains_key(&kind) {
                Ok(())
            } else {
                Err(CompileError::UnknownNode(kind.to_string()))
            }
        };

        let entry = entry.ok_or(CompileError::MissingEntry)?;
        registered(entry)?;

        let mut edges: HashMap<NodeKind, Edge> = HashMap::new();

        for (from, to) in static_edges {
            registered(from)?;
            if let Route::Node(target) = to {
                registered(target)?;
            }
            if edges.insert(from, Edge::Static(to)).is_some() {
                return Err(CompileError::AmbiguousEdges(from.to_string()));
            }
        }

        for (from, router) in conditional {
            registered(from)?;
            if edges.insert(from, Edge::Conditional(router)).is_some() {
                return Err(CompileError::AmbiguousEdges(from.to_string()));
            }
        }

        // Checked in declaration order so the reported node is stable
        for kind in NodeKind::ALL {
            if nodes.contains_key(&kind) && !edges.contains_key(&kind) {
                return Err(CompileError::Dangling(kind.to_string()));
            }
        }

        log::debug!("Compiled graph with {} nodes, entry {}", nodes.len(), entry);
        Ok(CompiledGraph::new(nodes, entry, edges, recursion_limit))
    }
}

/// Where the Orchestrator may send control; anything else ends the run
pub fn route_from_orchestrator(state: &AgentState) -> Route {
    match state.next_node {
        Route::Node(NodeKind::Decomposer) => Route::Node(NodeKind::Decomposer),
        Route::Node(NodeKind::Coder) => Route::Node(NodeKind::Coder),
        Route::Node(NodeKind::FinalAnswer) => Route::Node(NodeKind::FinalAnswer),
        Route::End => Route::End,
        Route::Node(other) => {
            log::warn!("Orchestrator requested {}, ending run", other);
            Route::End
        }
    }
}

/// The six-node multi-hop pipeline
pub fn build_agent_graph(
    chat: Chat,
    executor: Arc<dyn CodeExecutor>,
    settings: &AgentSettings,
) -> Result<CompiledGraph, CompileError> {
    let threshold = settings.stall_threshold;

    GraphBuilder::new()
        .add_node(Arc::new(Orchestrator::new(chat.clone(), threshold)))
        .add_node(Arc::new(Decomposer::new(chat.clone())))
        .add_node(Arc::new(FactRecall::new(chat.clone())))
        .add_node(Arc::new(Coder::new(chat.clone(), executor)))
        .add_node(Arc::new(ProgressAssessment::new(chat.clone(), threshold)))
        .add_node(Arc::new(FinalAnswer::new(chat, threshold)))
        .set_entry(NodeKind::Orchestrator)
        .add_conditional_edge(NodeKind::Orchestrator, route_from_orchestrator)
        .add_edge(NodeKind::Decomposer, NodeKind::FactRecall)
        .add_edge(NodeKind::FactRecall, NodeKind::ProgressAssessment)
        .add_edge(NodeKind::Coder, NodeKind::ProgressAssessment)
        .add_edge(NodeKind::ProgressAssessment, NodeKind::Orchestrator)
        .add_edge(NodeKind::FinalAnswer, Route::End)
        .recursion_limit(settings.recursion_limit)
        .compile()
}
