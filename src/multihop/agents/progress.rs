// SPDX-License-Identifier: MIT

//! ProgressAssessment - folds worker replies into the ledger and tracks stalls

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use super::Node;
use crate::adk::error::Result;
use crate::multihop::graph::types::NodeKind;
use crate::multihop::llm::{Chat, OutputFormat, Structured};
use crate::multihop::prompts;
use crate::multihop::state::{AgentState, Assessment, StateUpdate};

const NO_REASON: &str = "No reason provided";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ProgressOut {
    /// Whether the latest response moved the task forward
    pub is_progress_being_made: bool,
    /// Short justification
    #[serde(default)]
    pub progress_reason: String,
}

pub struct ProgressAssessment {
    chat: Chat,
    stall_threshold: u32,
    format: OutputFormat<ProgressOut>,
}

impl ProgressAssessment {
    pub fn new(chat: Chat, stall_threshold: u32) -> Self {
        Self {
            chat,
            stall_threshold,
            format: OutputFormat::new(),
        }
    }

    async fn assess(&self, task: &str, state: &AgentState, question: &str, reply: &str) -> Assessment {
        let previous = state.answered_questions.excluding(question);
        let user = prompts::progress_user(task, &previous, question, reply);

        match self
            .chat
            .structured(&prompts::progress_system(), &user, &self.format)
            .await
        {
            Structured::Parsed(out) => Assessment {
                is_progress_being_made: out.is_progress_being_made,
                progress_reason: if out.progress_reason.trim().is_empty() {
                    NO_REASON.to_string()
                } else {
                    out.progress_reason
                },
            },
            Structured::Raw(_) => {
                log::warn!("ProgressAssessment: unparsed assessment counted as a stall");
                Assessment {
                    is_progress_being_made: false,
                    progress_reason: NO_REASON.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl Node for ProgressAssessment {
    fn kind(&self) -> NodeKind {
        NodeKind::ProgressAssessment
    }

    async fn run(&self, state: &AgentState) -> Result<StateUpdate> {
        let question = state.prompt.clone();
        let mut update = StateUpdate {
            last_question: Some(Some(question.clone())),
            last_agent_reply: Some(state.reply.clone()),
            ..StateUpdate::routed(NodeKind::Orchestrator)
        };

        // The assessment reads the ledger with this reply already folded in
        let mut working = state.clone();
        if let (Some(sender @ (NodeKind::FactRecall | NodeKind::Coder)), Some(reply)) =
            (state.sender, state.reply.as_ref())
        {
            log::info!("ProgressAssessment: aggregating result from {}", sender);
            working.answered_questions.insert(question.clone(), reply.clone());

            if !working.fact_sheet.is_empty() {
                working.fact_sheet.push('\n');
            }
            let line = match sender {
                NodeKind::Coder => format!("- Coder Action: {}\nResult: {}", question, reply),
                _ => format!("- Q: {}\nA: {}", question, reply),
            };
            working.fact_sheet.push_str(&line);

            update.answered_questions = Some(working.answered_questions.clone());
            update.fact_sheet = Some(working.fact_sheet.clone());
            if sender == NodeKind::Coder {
                update.coder_code = Some(None);
                update.coder_result = Some(None);
            }
        }

        let mut tracker = state.progress.clone();
        // Empty worker replies are assessed too
        let reason = match (state.sender, state.reply.as_deref()) {
            (Some(NodeKind::FactRecall | NodeKind::Coder), Some(reply)) => {
                let assessment = self.assess(&state.task, &working, &question, reply).await;
                let reason = assessment.progress_reason.clone();
                let stalled = !assessment.is_progress_being_made;
                tracker.record(assessment);
                if stalled {
                    update.stall_reason = Some(Some(reason.clone()));
                }
                update.tokens_used = Some(self.chat.tokens_used());
                reason
            }
            _ => "No recent interaction to assess".to_string(),
        };

        let stall_count = tracker.stall_count;
        let sender = state.sender.map(|s| s.as_str()).unwrap_or("None");
        let mut entry = format!(
            "Progress Assessment: Aggregated {} response. Stall Count = {}, Reason: {}",
            sender, stall_count, reason
        );
        if stall_count >= self.stall_threshold {
            log::warn!("ProgressAssessment: {} consecutive stalls", stall_count);
            entry.push_str(&format!(
                ", ALERT: {} consecutive stalls detected",
                stall_count
            ));
        }
        log::info!("{}", entry);

        update.progress = Some(tracker);
        Ok(update.with_log(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multihop::graph::types::Route;
    use crate::multihop::llm::testing::{chat, ScriptedModel};

    const PROGRESS: &str = r#"{"is_progress_being_made": true, "progress_reason": "new fact"}"#;
    const STALL: &str = r#"{"is_progress_being_made": false, "progress_reason": "repeated answer"}"#;

    fn after_fact_recall(question: &str, answer: &str) -> AgentState {
        let mut state = AgentState::new("When was the author of Dune born?");
        state.prompt = question.to_string();
        state.reply = Some(answer.to_string());
        state.sender = Some(NodeKind::FactRecall);
        state
    }

    #[tokio::test]
    async fn test_aggregates_fact_and_resets_stalls() {
        let model = ScriptedModel::new(&[PROGRESS]);
        let node = ProgressAssessment::new(chat(model.clone()), 3);
        let mut state = after_fact_recall("Who wrote Dune?", "Frank Herbert");
        state.progress.stall_count = 2;

        let update = node.run(&state).await.unwrap();

        let ledger = update.answered_questions.clone().unwrap();
        assert_eq!(ledger.get("Who wrote Dune?"), Some("Frank Herbert"));
        assert_eq!(
            update.fact_sheet.as_deref(),
            Some("- Q: Who wrote Dune?\nA: Frank Herbert")
        );
        assert_eq!(update.progress.as_ref().unwrap().stall_count, 0);
        assert!(update.stall_reason.is_none());
        assert_eq!(update.next_node, Some(Route::Node(NodeKind::Orchestrator)));
        assert_eq!(
            update.log,
            vec!["Progress Assessment: Aggregated FactRecall response. Stall Count = 0, Reason: new fact"]
        );
        // The question being assessed is not listed as previous knowledge
        assert!(model.last_user().contains("Previous Knowledge (Answered Questions):\nNone"));
    }

    #[tokio::test]
    async fn test_stall_increments_and_sets_reason() {
        let model = ScriptedModel::new(&[STALL]);
        let node = ProgressAssessment::new(chat(model), 3);
        let mut state = after_fact_recall("Who wrote Dune?", "Frank Herbert");
        state.progress.stall_count = 2;

        let update = node.run(&state).await.unwrap();

        assert_eq!(update.progress.as_ref().unwrap().stall_count, 3);
        assert_eq!(update.stall_reason, Some(Some("repeated answer".to_string())));
        assert!(update.log[0].ends_with(", ALERT: 3 consecutive stalls detected"));
    }

    #[tokio::test]
    async fn test_unparsed_assessment_is_a_stall() {
        let model = ScriptedModel::new(&["looks fine to me"]);
        let node = ProgressAssessment::new(chat(model), 3);

        let update = node
            .run(&after_fact_recall("Who wrote Dune?", "Frank Herbert"))
            .await
            .unwrap();

        let tracker = update.progress.unwrap();
        assert_eq!(tracker.stall_count, 1);
        assert_eq!(
            tracker.last_assessment.unwrap().progress_reason,
            "No reason provided"
        );
    }

    #[tokio::test]
    async fn test_coder_reply_is_recorded_as_action() {
        let model = ScriptedModel::new(&[PROGRESS]);
        let node = ProgressAssessment::new(chat(model), 3);
        let mut state = AgentState::new("t");
        state.fact_sheet = "- Q: q\nA: a".to_string();
        state.prompt = "Compute 2024 - 1950".to_string();
        state.reply = Some("74".to_string());
        state.sender = Some(NodeKind::Coder);
        state.coder_code = Some("print(2024 - 1950)".to_string());
        state.coder_result = Some("74".to_string());

        let update = node.run(&state).await.unwrap();

        assert_eq!(
            update.fact_sheet.as_deref(),
            Some("- Q: q\nA: a\n- Coder Action: Compute 2024 - 1950\nResult: 74")
        );
        assert_eq!(update.coder_code, Some(None));
        assert_eq!(update.coder_result, Some(None));
    }

    #[tokio::test]
    async fn test_empty_coder_output_counts_as_stall() {
        let model = ScriptedModel::new(&[STALL]);
        let node = ProgressAssessment::new(chat(model.clone()), 3);
        let mut state = AgentState::new("t");
        state.prompt = "Print the year".to_string();
        state.reply = Some(String::new());
        state.sender = Some(NodeKind::Coder);
        state.progress.stall_count = 1;

        let update = node.run(&state).await.unwrap();

        assert_eq!(model.calls(), 1);
        assert_eq!(update.progress.unwrap().stall_count, 2);
        assert_eq!(update.stall_reason, Some(Some("repeated answer".to_string())));
        assert_eq!(
            update.answered_questions.unwrap().get("Print the year"),
            Some("")
        );
    }

    #[tokio::test]
    async fn test_skips_assessment_without_reply() {
        let model = ScriptedModel::new(&[]);
        let node = ProgressAssessment::new(chat(model.clone()), 3);
        let mut state = AgentState::new("t");
        state.prompt = "q".to_string();

        let update = node.run(&state).await.unwrap();

        assert_eq!(model.calls(), 0);
        assert!(update.answered_questions.is_none());
        assert_eq!(update.progress.unwrap().stall_count, 0);
        assert!(update.log[0].ends_with("Reason: No recent interaction to assess"));
    }
}
