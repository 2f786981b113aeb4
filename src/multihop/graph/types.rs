//! Graph type definitions
//!
//! Node identities and routing targets shared by the state, the nodes and
//! the executor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The six roles in the multi-hop pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Orchestrator,
    Decomposer,
    FactRecall,
    Coder,
    ProgressAssessment,
    FinalAnswer,
}

impl NodeKind {
    pub const ALL: [NodeKind; 6] = [
        NodeKind::Orchestrator,
        NodeKind::Decomposer,
        NodeKind::FactRecall,
        NodeKind::Coder,
        NodeKind::ProgressAssessment,
        NodeKind::FinalAnswer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Orchestrator => "Orchestrator",
            NodeKind::Decomposer => "Decomposer",
            NodeKind::FactRecall => "FactRecall",
            NodeKind::Coder => "Coder",
            NodeKind::ProgressAssessment => "ProgressAssessment",
            NodeKind::FinalAnswer => "FinalAnswer",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown node: {}", s))
    }
}

/// Where control goes after a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Route {
    Node(NodeKind),
    End,
}

impl Route {
    pub fn is_end(&self) -> bool {
        matches!(self, Route::End)
    }
}

impl From<NodeKind> for Route {
    fn from(kind: NodeKind) -> Self {
        Route::Node(kind)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Node(kind) => kind.fmt(f),
            Route::End => f.write_str("END"),
        }
    }
}

impl FromStr for Route {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "END" {
            Ok(Route::End)
        } else {
            s.parse().map(Route::Node)
        }
    }
}

impl From<Route> for String {
    fn from(route: Route) -> Self {
        route.to_string()
    }
}

impl TryFrom<String> for Route {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
