// SPDX-License-Identifier: MIT

//! Orchestrator - picks the next worker

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use super::Node;
use crate::adk::error::Result;
use crate::multihop::graph::types::{NodeKind, Route};
use crate::multihop::llm::{Chat, OutputFormat, Structured};
use crate::multihop::prompts::{self, OrchestratorContext};
use crate::multihop::state::{AgentState, StateUpdate};

/// Routing decision returned by the model
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct OrchDecision {
    /// One of DECOMPOSE, ASK_CODER or FINAL_ANSWER
    pub decision: String,
    /// Why this step was chosen
    #[serde(default)]
    pub reasoning: String,
    /// Coder instruction, or optional guidance for the final answer
    #[serde(default)]
    pub instruction_or_question: String,
}

pub struct Orchestrator {
    chat: Chat,
    stall_threshold: u32,
    format: OutputFormat<OrchDecision>,
}

impl Orchestrator {
    pub fn new(chat: Chat, stall_threshold: u32) -> Self {
        Self {
            chat,
            stall_threshold,
            format: OutputFormat::new(),
        }
    }

    fn coder_activity(state: &AgentState) -> Option<String> {
        if state.sender != Some(NodeKind::Coder) {
            return None;
        }
        let result = state.reply.as_ref().or(state.coder_result.as_ref())?;
        Some(format!("Instruction: {}\nResult: {}", state.prompt, result))
    }

    async fn decide(&self, state: &AgentState) -> OrchDecision {
        let context = OrchestratorContext {
            task: &state.task,
            answered: &state.answered_questions,
            last_agent: state.sender.map(|s| s.as_str()),
            last_prompt: &state.prompt,
            last_reply: state.reply.as_deref(),
            coder_activity: Self::coder_activity(state),
            stall_count: state.stall_count(),
            stall_reason: state.stall_reason.as_deref(),
        };
        let user = prompts::orchestrator_user(&context);

        match self
            .chat
            .structured(&prompts::orchestrator_system(), &user, &self.format)
            .await
        {
            Structured::Parsed(decision) => decision,
            Structured::Raw(_) => OrchDecision {
                decision: "ERROR".to_string(),
                reasoning: "Failed to parse decision".to_string(),
                instruction_or_question: String::new(),
            },
        }
    }
}

#[async_trait]
impl Node for Orchestrator {
    fn kind(&self) -> NodeKind {
        NodeKind::Orchestrator
    }

    async fn run(&self, state: &AgentState) -> Result<StateUpdate> {
        let stall_count = state.stall_count();
        log::info!(
            "Orchestrator: deciding (stall_count: {}, stall_reason: {})",
            stall_count,
            state.stall_reason.as_deref().unwrap_or("None")
        );

        if stall_count >= self.stall_threshold {
            log::warn!(
                "Orchestrator: {} consecutive stalls, forcing FinalAnswer",
                stall_count
            );
            return Ok(StateUpdate {
                stall_reason: Some(Some(format!(
                    "Terminated due to {} consecutive stalls",
                    stall_count
                ))),
                ..StateUpdate::routed(NodeKind::FinalAnswer)
            }
            .with_log("Orchestrator: Routing to FinalAnswer due to stall termination"));
        }

        if state.answered_questions.is_empty() {
            return Ok(StateUpdate::routed(NodeKind::Decomposer)
                .with_log("Orchestrator: Initial routing to Decomposer"));
        }

        let decision = self.decide(state).await;
        let mut entry = format!(
            "Orchestrator Decision: {} - {}",
            decision.decision,
            if decision.reasoning.is_empty() {
                "No reasoning provided."
            } else {
                decision.reasoning.as_str()
            }
        );

        let mut update = match decision.decision.as_str() {
            "DECOMPOSE" => {
                entry.push_str(" → Routing to Decomposer");
                StateUpdate::routed(NodeKind::Decomposer)
            }
            "ASK_CODER" => {
                entry.push_str(&format!(
                    " → Routing to Coder: '{}'",
                    decision.instruction_or_question
                ));
                StateUpdate {
                    prompt: Some(decision.instruction_or_question),
                    ..StateUpdate::routed(NodeKind::Coder)
                }
            }
            "FINAL_ANSWER" => {
                entry.push_str(" → Routing to FinalAnswer");
                let instruction = decision.instruction_or_question;
                StateUpdate {
                    final_answer_instruction: (!instruction.trim().is_empty())
                        .then(|| Some(instruction)),
                    ..StateUpdate::routed(NodeKind::FinalAnswer)
                }
            }
            other => {
                log::error!("Orchestrator: unexpected decision type '{}'", other);
                entry.push_str(" → ERROR: Unexpected decision, ending");
                StateUpdate {
                    prompt: Some(format!("ERROR: Unexpected decision type: {}", other)),
                    ..StateUpdate::routed(Route::End)
                }
            }
        };

        log::info!("{}", entry);
        update.tokens_used = Some(self.chat.tokens_used());
        Ok(update.with_log(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multihop::llm::testing::{chat, ScriptedModel};

    fn state_with_fact() -> AgentState {
        let mut state = AgentState::new("How old was the author when the book came out?");
        state.answered_questions.insert("Who wrote the book?", "Jane Doe");
        state
    }

    #[tokio::test]
    async fn test_routes_to_decomposer_without_llm_when_ledger_empty() {
        let model = ScriptedModel::new(&[]);
        let node = Orchestrator::new(chat(model.clone()), 3);

        let update = node.run(&AgentState::new("t")).await.unwrap();

        assert_eq!(update.next_node, Some(Route::Node(NodeKind::Decomposer)));
        assert_eq!(update.log, vec!["Orchestrator: Initial routing to Decomposer"]);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_stall_threshold_forces_final_answer() {
        let model = ScriptedModel::new(&[]);
        let node = Orchestrator::new(chat(model.clone()), 3);
        let mut state = state_with_fact();
        state.progress.stall_count = 3;

        let update = node.run(&state).await.unwrap();

        assert_eq!(update.next_node, Some(Route::Node(NodeKind::FinalAnswer)));
        assert_eq!(
            update.stall_reason,
            Some(Some("Terminated due to 3 consecutive stalls".to_string()))
        );
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_ask_coder_sets_prompt() {
        let model = ScriptedModel::new(&[
            r#"{"decision": "ASK_CODER", "reasoning": "need arithmetic", "instruction_or_question": "Compute 2024 - 1950"}"#,
        ]);
        let node = Orchestrator::new(chat(model), 3);

        let update = node.run(&state_with_fact()).await.unwrap();

        assert_eq!(update.next_node, Some(Route::Node(NodeKind::Coder)));
        assert_eq!(update.prompt.as_deref(), Some("Compute 2024 - 1950"));
        assert_eq!(
            update.log,
            vec!["Orchestrator Decision: ASK_CODER - need arithmetic → Routing to Coder: 'Compute 2024 - 1950'"]
        );
        assert_eq!(update.tokens_used, Some(10));
    }

    #[tokio::test]
    async fn test_final_answer_keeps_instruction() {
        let model = ScriptedModel::new(&[
            r#"{"decision": "FINAL_ANSWER", "reasoning": "enough", "instruction_or_question": "answer in years"}"#,
        ]);
        let node = Orchestrator::new(chat(model), 3);

        let update = node.run(&state_with_fact()).await.unwrap();

        assert_eq!(update.next_node, Some(Route::Node(NodeKind::FinalAnswer)));
        assert_eq!(
            update.final_answer_instruction,
            Some(Some("answer in years".to_string()))
        );
        assert!(update.prompt.is_none());
    }

    #[tokio::test]
    async fn test_blank_instruction_is_not_stored() {
        let model = ScriptedModel::new(&[r#"{"decision": "FINAL_ANSWER", "reasoning": "done"}"#]);
        let node = Orchestrator::new(chat(model), 3);

        let update = node.run(&state_with_fact()).await.unwrap();

        assert!(update.final_answer_instruction.is_none());
    }

    #[tokio::test]
    async fn test_unparsed_decision_ends_run() {
        let model = ScriptedModel::new(&["I think we should decompose further"]);
        let node = Orchestrator::new(chat(model), 3);

        let update = node.run(&state_with_fact()).await.unwrap();

        assert_eq!(update.next_node, Some(Route::End));
        assert_eq!(
            update.prompt.as_deref(),
            Some("ERROR: Unexpected decision type: ERROR")
        );
        assert!(update.log[0].starts_with("Orchestrator Decision: ERROR - Failed to parse decision"));
    }

    #[tokio::test]
    async fn test_unknown_decision_ends_run() {
        let model = ScriptedModel::new(&[r#"{"decision": "SEARCH", "reasoning": "web"}"#]);
        let node = Orchestrator::new(chat(model), 3);

        let update = node.run(&state_with_fact()).await.unwrap();

        assert_eq!(update.next_node, Some(Route::End));
        assert_eq!(
            update.prompt.as_deref(),
            Some("ERROR: Unexpected decision type: SEARCH")
        );
    }

    #[tokio::test]
    async fn test_prompt_includes_coder_activity() {
        let model = ScriptedModel::new(&[r#"{"decision": "DECOMPOSE", "reasoning": "more"}"#]);
        let node = Orchestrator::new(chat(model.clone()), 3);
        let mut state = state_with_fact();
        state.sender = Some(NodeKind::Coder);
        state.prompt = "Compute 2024 - 1950".to_string();
        state.reply = Some("74".to_string());

        let update = node.run(&state).await.unwrap();

        assert_eq!(update.next_node, Some(Route::Node(NodeKind::Decomposer)));
        let user = model.last_user();
        assert!(user.contains("CODER ACTIVITY:\nInstruction: Compute 2024 - 1950\nResult: 74"));
        assert!(user.contains("- Q: Who wrote the book?\nA: Jane Doe"));
    }
}
