// SPDX-License-Identifier: MIT

//! Pipeline nodes
//!
//! Each node reads the shared [`AgentState`] and returns a [`StateUpdate`]:
//! - `Orchestrator` - policy router
//! - `Decomposer` - writes the next sub-question
//! - `FactRecall` - answers a sub-question from model knowledge
//! - `Coder` - writes and runs code for computations
//! - `ProgressAssessment` - aggregates replies and tracks stalls
//! - `FinalAnswer` - synthesizes the answer

mod coder;
mod decomposer;
mod fact_recall;
mod final_answer;
mod orchestrator;
mod progress;

pub use coder::{extract_code_block, Coder};
pub use decomposer::{DecompOut, Decomposer};
pub use fact_recall::{FactRecall, RecallOut};
pub use final_answer::{FinalAnswer, FinalAnswerOut};
pub use orchestrator::{OrchDecision, Orchestrator};
pub use progress::{ProgressAssessment, ProgressOut};

use async_trait::async_trait;

use crate::adk::error::Result;
use crate::multihop::graph::types::NodeKind;
use crate::multihop::state::{AgentState, StateUpdate};

/// One step of the agent graph
#[async_trait]
pub trait Node: Send + Sync {
    fn kind(&self) -> NodeKind;

    /// Compute this node's contribution to the state
    async fn run(&self, state: &AgentState) -> Result<StateUpdate>;
}
