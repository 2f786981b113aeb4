// SPDX-License-Identifier: MIT

//! Shared state threaded through the agent graph
//!
//! Nodes never mutate [`AgentState`] directly. Each returns a
//! [`StateUpdate`] which the executor folds in with [`AgentState::apply`]:
//! `log` entries append, every other field present in the update
//! overwrites, absent fields are left alone.

mod ledger;

pub use ledger::AnsweredQuestions;

use serde::{Deserialize, Serialize};

use crate::multihop::graph::types::{NodeKind, Route};

/// Outcome of the most recent progress check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub is_progress_being_made: bool,
    pub progress_reason: String,
}

/// Consecutive-stall bookkeeping maintained by ProgressAssessment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressTracker {
    pub stall_count: u32,
    pub last_assessment: Option<Assessment>,
}

impl ProgressTracker {
    /// Fold in an assessment: progress resets the count, a stall bumps it
    pub fn record(&mut self, assessment: Assessment) {
        if assessment.is_progress_being_made {
            self.stall_count = 0;
        } else {
            self.stall_count += 1;
        }
        self.last_assessment = Some(assessment);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub task: String,
    /// Instruction or question handed to the next worker
    pub prompt: String,
    pub reply: Option<String>,
    pub sender: Option<NodeKind>,
    pub log: Vec<String>,
    pub next_node: Route,
    pub fact_sheet: String,
    pub answered_questions: AnsweredQuestions,
    pub coder_code: Option<String>,
    pub coder_result: Option<String>,
    pub progress: ProgressTracker,
    pub last_question: Option<String>,
    pub last_agent_reply: Option<String>,
    pub stall_reason: Option<String>,
    pub final_answer_instruction: Option<String>,
    pub final_answer: Option<String>,
    pub tokens_used: u64,
}

impl AgentState {
    /// Fresh state for a task, routed at the Orchestrator
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            prompt: String::new(),
            reply: None,
            sender: None,
            log: Vec::new(),
            next_node: Route::Node(NodeKind::Orchestrator),
            fact_sheet: String::new(),
            answered_questions: AnsweredQuestions::new(),
            coder_code: None,
            coder_result: None,
            progress: ProgressTracker::default(),
            last_question: None,
            last_agent_reply: None,
            stall_reason: None,
            final_answer_instruction: None,
            final_answer: None,
            tokens_used: 0,
        }
    }

    /// Best answer so far: the final answer, else the latest reply
    pub fn best_answer(&self) -> Option<&str> {
        self.final_answer
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.reply.as_deref().filter(|s| !s.is_empty()))
    }

    pub fn stall_count(&self) -> u32 {
        self.progress.stall_count
    }

    /// Merge a node's update into the state
    pub fn apply(&mut self, update: StateUpdate) {
        let StateUpdate {
            prompt,
            reply,
            sender,
            log,
            next_node,
            fact_sheet,
            answered_questions,
            coder_code,
            coder_result,
            progress,
            last_question,
            last_agent_reply,
            stall_reason,
            final_answer_instruction,
            final_answer,
            tokens_used,
        } = update;

        self.log.extend(log);

        if let Some(v) = prompt {
            self.prompt = v;
        }
        if let Some(v) = reply {
            self.reply = v;
        }
        if let Some(v) = sender {
            self.sender = Some(v);
        }
        if let Some(v) = next_node {
            self.next_node = v;
        }
        if let Some(v) = fact_sheet {
            self.fact_sheet = v;
        }
        if let Some(v) = answered_questions {
            self.answered_questions = v;
        }
        if let Some(v) = coder_code {
            self.coder_code = v;
        }
        if let Some(v) = coder_result {
            self.coder_result = v;
        }
        if let Some(v) = progress {
            self.progress = v;
        }
        if let Some(v) = last_question {
            self.last_question = v;
        }
        if let Some(v) = last_agent_reply {
            self.last_agent_reply = v;
        }
        if let Some(v) = stall_reason {
            self.stall_reason = v;
        }
        if let Some(v) = final_answer_instruction {
            self.final_answer_instruction = v;
        }
        if let Some(v) = final_answer {
            self.final_answer = v;
        }
        if let Some(v) = tokens_used {
            self.tokens_used = v;
        }
    }
}

/// Partial state produced by a node
///
/// `Option<Option<T>>` fields distinguish "leave alone" (`None`) from
/// "clear" (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub prompt: Option<String>,
    pub reply: Option<Option<String>>,
    pub sender: Option<NodeKind>,
    pub log: Vec<String>,
    pub next_node: Option<Route>,
    pub fact_sheet: Option<String>,
    pub answered_questions: Option<AnsweredQuestions>,
    pub coder_code: Option<Option<String>>,
    pub coder_result: Option<Option<String>>,
    pub progress: Option<ProgressTracker>,
    pub last_question: Option<Option<String>>,
    pub last_agent_reply: Option<Option<String>>,
    pub stall_reason: Option<Option<String>>,
    pub final_answer_instruction: Option<Option<String>>,
    pub final_answer: Option<Option<String>>,
    pub tokens_used: Option<u64>,
}

impl StateUpdate {
    pub fn routed(next: impl Into<Route>) -> Self {
        Self {
            next_node: Some(next.into()),
            ..Default::default()
        }
    }

    pub fn with_log(mut self, entry: impl Into<String>) -> Self {
        self.log.push(entry.into());
        self
    }
}
