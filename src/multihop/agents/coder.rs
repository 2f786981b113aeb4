// SPDX-License-Identifier: MIT

//! Coder - turns an instruction into code and runs it

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use super::Node;
use crate::adk::error::Result;
use crate::multihop::coder::CodeExecutor;
use crate::multihop::graph::types::NodeKind;
use crate::multihop::llm::Chat;
use crate::multihop::prompts;
use crate::multihop::state::{AgentState, StateUpdate};

static CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?si)```(?:python|py)?\s*\n(.*?)```").expect("valid regex"));

/// First ```python / ```py / bare fenced block, trimmed
pub fn extract_code_block(text: &str) -> Option<String> {
    CODE_BLOCK
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

pub struct Coder {
    chat: Chat,
    executor: Arc<dyn CodeExecutor>,
}

impl Coder {
    pub fn new(chat: Chat, executor: Arc<dyn CodeExecutor>) -> Self {
        Self { chat, executor }
    }
}

#[async_trait]
impl Node for Coder {
    fn kind(&self) -> NodeKind {
        NodeKind::Coder
    }

    async fn run(&self, state: &AgentState) -> Result<StateUpdate> {
        let instruction = &state.prompt;
        let response = self.chat.complete(prompts::coder_system(), instruction).await;

        let code = extract_code_block(&response);
        let (reply, result, entry) = match &code {
            Some(code) => match self.executor.execute(code).await {
                Ok(output) => {
                    log::info!("Coder: execution output: {}", output);
                    let entry = format!(
                        "Coder: Prompt='{}', Code Executed, Output='{}'",
                        instruction, output
                    );
                    (output.clone(), output, entry)
                }
                Err(e) => {
                    log::error!("Coder: error during code execution: {}", e);
                    let failure = format!("Error during execution: {}", e);
                    let entry = format!(
                        "Coder: Prompt='{}', Code Execution Failed, Error='{}'",
                        instruction, failure
                    );
                    (format!("Error: {}", failure), failure, entry)
                }
            },
            None => {
                log::warn!("Coder: no code block found in response");
                let entry = format!(
                    "Coder: Prompt='{}', No Code Generated, Reply='{}'",
                    instruction, response
                );
                return Ok(StateUpdate {
                    reply: Some(Some(response)),
                    sender: Some(NodeKind::Coder),
                    coder_code: Some(None),
                    coder_result: Some(None),
                    tokens_used: Some(self.chat.tokens_used()),
                    ..StateUpdate::routed(NodeKind::ProgressAssessment)
                }
                .with_log(entry));
            }
        };

        Ok(StateUpdate {
            reply: Some(Some(reply)),
            sender: Some(NodeKind::Coder),
            coder_code: Some(code),
            coder_result: Some(Some(result)),
            tokens_used: Some(self.chat.tokens_used()),
            ..StateUpdate::routed(NodeKind::ProgressAssessment)
        }
        .with_log(entry))
    }
}
