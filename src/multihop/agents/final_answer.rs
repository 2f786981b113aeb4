// SPDX-License-Identifier: MIT

//! FinalAnswer - writes the answer from the ledger

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use super::Node;
use crate::adk::error::Result;
use crate::multihop::graph::types::{NodeKind, Route};
use crate::multihop::llm::{Chat, OutputFormat, Structured};
use crate::multihop::prompts;
use crate::multihop::state::{AgentState, StateUpdate};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FinalAnswerOut {
    /// Direct answer to the user task
    pub answer: String,
}

pub struct FinalAnswer {
    chat: Chat,
    stall_threshold: u32,
    format: OutputFormat<FinalAnswerOut>,
}

impl FinalAnswer {
    pub fn new(chat: Chat, stall_threshold: u32) -> Self {
        Self {
            chat,
            stall_threshold,
            format: OutputFormat::new(),
        }
    }
}

#[async_trait]
impl Node for FinalAnswer {
    fn kind(&self) -> NodeKind {
        NodeKind::FinalAnswer
    }

    async fn run(&self, state: &AgentState) -> Result<StateUpdate> {
        let stall_count = state.stall_count();
        let stalled_after = (stall_count >= self.stall_threshold).then_some(stall_count);
        let user = prompts::final_answer_user(
            &state.task,
            &state.answered_questions,
            state.final_answer_instruction.as_deref(),
            stalled_after,
        );

        let answer = match self
            .chat
            .structured(prompts::final_answer_system(), &user, &self.format)
            .await
        {
            Structured::Parsed(out) => out.answer,
            Structured::Raw(text) => text,
        };
        log::info!("FinalAnswer: {}", answer);

        let facts = state.answered_questions.len();
        Ok(StateUpdate {
            prompt: Some(answer.clone()),
            reply: Some(Some(answer.clone())),
            final_answer: Some(Some(answer)),
            sender: Some(NodeKind::FinalAnswer),
            tokens_used: Some(self.chat.tokens_used()),
            ..StateUpdate::routed(Route::End)
        }
        .with_log(format!(
            "FinalAnswer: Synthesized final response from {} facts",
            facts
        )))
    }
}
