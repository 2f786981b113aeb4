// SPDX-License-Identifier: MIT

//! Decomposer - one new sub-question per turn

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use super::Node;
use crate::adk::error::Result;
use crate::multihop::graph::types::NodeKind;
use crate::multihop::llm::{Chat, OutputFormat, Structured};
use crate::multihop::prompts;
use crate::multihop::state::{AgentState, StateUpdate};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DecompOut {
    /// The next atomic sub-question
    pub question: String,
}

pub struct Decomposer {
    chat: Chat,
    format: OutputFormat<DecompOut>,
}

impl Decomposer {
    pub fn new(chat: Chat) -> Self {
        Self {
            chat,
            format: OutputFormat::new(),
        }
    }
}

#[async_trait]
impl Node for Decomposer {
    fn kind(&self) -> NodeKind {
        NodeKind::Decomposer
    }

    async fn run(&self, state: &AgentState) -> Result<StateUpdate> {
        let user = prompts::decomposer_user(&state.task, &state.answered_questions);
        let question = match self
            .chat
            .structured(prompts::decomposer_system(), &user, &self.format)
            .await
        {
            Structured::Parsed(out) => out.question.trim().to_string(),
            Structured::Raw(text) => text.trim().to_string(),
        };
        log::info!("Decomposer: generated question: {}", question);

        Ok(StateUpdate {
            log: vec![format!("Decomposer: Generated question '{}'", question)],
            prompt: Some(question),
            sender: Some(NodeKind::Decomposer),
            tokens_used: Some(self.chat.tokens_used()),
            ..StateUpdate::routed(NodeKind::FactRecall)
        })
    }
}
