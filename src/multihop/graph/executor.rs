//! Graph executor

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::types::{NodeKind, Route};
use crate::adk::error::GraphError;
use crate::multihop::agents::Node;
use crate::multihop::state::AgentState;

/// Picks the next node from the state a node just produced
pub type Router = Arc<dyn Fn(&AgentState) -> Route + Send + Sync>;

pub(crate) enum Edge {
    Static(Route),
    Conditional(Router),
}

/// Progress report emitted while a graph runs
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    Step {
        step: u32,
        node: NodeKind,
        log: Vec<String>,
        next: Route,
    },
    Finished {
        steps: u32,
        final_answer: Option<String>,
        tokens_used: u64,
    },
    /// The run stopped early; `partial_answer` is the best answer so far
    Failed {
        error: String,
        partial_answer: Option<String>,
        tokens_used: u64,
    },
}

/// Validated graph ready to run
pub struct CompiledGraph {
    nodes: HashMap<NodeKind, Arc<dyn Node>>,
    entry: NodeKind,
    edges: HashMap<NodeKind, Edge>,
    recursion_limit: u32,
}

impl CompiledGraph {
    pub(crate) fn new(
        nodes: HashMap<NodeKind, Arc<dyn Node>>,
        entry: NodeKind,
        edges: HashMap<NodeKind, Edge>,
        recursion_limit: u32,
    ) -> Self {
        Self {
            nodes,
            entry,
            edges,
            recursion_limit,
        }
    }

    /// Run to END and return the final state
    pub async fn invoke(&self, mut state: AgentState) -> Result<AgentState, GraphError> {
        self.drive(&mut state, None).await?;
        Ok(state)
    }

    /// Like [`CompiledGraph::invoke`], reporting each step on `tx`
    pub async fn stream(
        &self,
        mut state: AgentState,
        tx: mpsc::Sender<GraphEvent>,
    ) -> Result<AgentState, GraphError> {
        self.drive(&mut state, Some(&tx)).await?;
        Ok(state)
    }

    /// Walk the graph, updating `state` in place
    ///
    /// On error `state` holds everything applied up to the failing step.
    /// Returns the number of steps taken.
    pub async fn drive(
        &self,
        state: &mut AgentState,
        events: Option<&mpsc::Sender<GraphEvent>>,
    ) -> Result<u32, GraphError> {
        match self.walk(state, events).await {
            Ok(steps) => {
                if let Some(tx) = events {
                    let _ = tx
                        .send(GraphEvent::Finished {
                            steps,
                            final_answer: state.final_answer.clone(),
                            tokens_used: state.tokens_used,
                        })
                        .await;
                }
                Ok(steps)
            }
            Err(e) => {
                log::error!("Graph execution failed: {}", e);
                if let Some(tx) = events {
                    let _ = tx
                        .send(GraphEvent::Failed {
                            error: e.to_string(),
                            partial_answer: state.best_answer().map(str::to_string),
                            tokens_used: state.tokens_used,
                        })
                        .await;
                }
                Err(e)
            }
        }
    }

    async fn walk(
        &self,
        state: &mut AgentState,
        events: Option<&mpsc::Sender<GraphEvent>>,
    ) -> Result<u32, GraphError> {
        let mut current = self.entry;
        let mut step = 0;

        loop {
            if step >= self.recursion_limit {
                return Err(GraphError::RecursionLimit(self.recursion_limit));
            }
            step += 1;

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| GraphError::UnknownNode(current.to_string()))?;

            log::info!("Graph step {}: executing {}", step, current);
            let update = node.run(state).await.map_err(|e| GraphError::Node {
                node: current.to_string(),
                message: e.to_string(),
            })?;
            let log = update.log.clone();
            state.apply(update);

            let next = match self.edges.get(&current) {
                Some(Edge::Static(route)) => *route,
                Some(Edge::Conditional(router)) => router(state),
                None => Route::End,
            };
            log::debug!("{} -> {}", current, next);

            if let Some(tx) = events {
                let _ = tx
                    .send(GraphEvent::Step {
                        step,
                        node: current,
                        log,
                        next,
                    })
                    .await;
            }

            match next {
                Route::End => {
                    log::info!("Graph reached END after {} steps", step);
                    return Ok(step);
                }
                Route::Node(kind) => current = kind,
            }
        }
    }
}
