// SPDX-License-Identifier: MIT

//! FactRecall - closed-book answer to the current sub-question

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
pub struct RecallOut {
    /// Answer to the sub-question only
    pub answer: String,
}

pub struct FactRecall {
    chat: Chat,
    format: OutputFormat<RecallOut>,
}

impl FactRecall {
    pub fn new(chat: Chat) -> Self {
        Self {
            chat,
            format: OutputFormat::new(),
        }
    }
}

#[async_trait]
impl Node for FactRecall {
    fn kind(&self) -> NodeKind {
        NodeKind::FactRecall
    }

    async fn run(&self, state: &AgentState) -> Result<StateUpdate> {
        let system = prompts::fact_recall_system(&state.task);
        let answer = match self
            .chat
            .structured(&system, &state.prompt, &self.format)
            .await
        {
            Structured::Parsed(out) => out.answer,
            Structured::Raw(text) => text,
        };
        log::info!("FactRecall: {} => {}", state.prompt, answer);

        Ok(StateUpdate {
            log: vec![format!(
                "FactRecall: Prompt='{}', Reply='{}'",
                state.prompt, answer
            )],
            reply: Some(Some(answer)),
            sender: Some(NodeKind::FactRecall),
            tokens_used: Some(self.chat.tokens_used()),
            ..StateUpdate::routed(NodeKind::ProgressAssessment)
        })
    }
}
