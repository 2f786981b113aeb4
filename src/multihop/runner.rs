// SPDX-License-Identifier: MIT

//! Runs the agent graph on single tasks and whole datasets

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::adk::error::Result;
use crate::adk::model::{GenerationConfig, Model};
use crate::multihop::coder::{CodeExecutor, PythonExecutor};
use crate::multihop::config::{AgentSettings, Settings};
use crate::multihop::graph::{build_agent_graph, GraphEvent};
use crate::multihop::llm::Chat;
use crate::multihop::state::AgentState;

pub const NO_ANSWER: &str = "No answer generated";

/// The answer to report for a finished (or abandoned) run
pub fn answer_of(state: &AgentState) -> &str {
    state.best_answer().unwrap_or(NO_ANSWER)
}

pub struct Runner {
    chat: Chat,
    executor: Arc<dyn CodeExecutor>,
    agent: AgentSettings,
}

impl Runner {
    /// Validate settings and the graph topology up front
    pub fn new(model: Arc<dyn Model>, settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let config = settings.generation.to_config().validated()?;
        let runner = Self {
            chat: Chat::new(model, config),
            executor: Arc::new(PythonExecutor::from_settings(&settings.coder)),
            agent: settings.agent,
        };
        build_agent_graph(runner.chat.clone(), runner.executor.clone(), &runner.agent)?;
        Ok(runner)
    }

    pub fn with_executor(mut self, executor: Arc<dyn CodeExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn model_name(&self) -> &str {
        self.chat.model_name()
    }

    /// Run with the default sampling settings
    pub async fn run(&self, task: &str) -> Result<AgentState> {
        self.execute(task, None, None).await
    }

    /// Run with per-request sampling settings
    pub async fn run_with(&self, task: &str, config: GenerationConfig) -> Result<AgentState> {
        self.execute(task, Some(config), None).await
    }

    /// Run while reporting every step on `tx`
    pub async fn run_stream(
        &self,
        task: &str,
        config: Option<GenerationConfig>,
        tx: mpsc::Sender<GraphEvent>,
    ) -> Result<AgentState> {
        self.execute(task, config, Some(&tx)).await
    }

    async fn execute(
        &self,
        task: &str,
        config: Option<GenerationConfig>,
        events: Option<&mpsc::Sender<GraphEvent>>,
    ) -> Result<AgentState> {
        let config = match config {
            Some(c) => c.validated()?,
            None => self.chat.config(),
        };
        // Token counts are per run
        let chat = self.chat.fork(config);
        let graph = build_agent_graph(chat.clone(), self.executor.clone(), &self.agent)?;

        log::info!("Running agent on task: {}", task);
        let mut state = AgentState::new(task);
        if let Err(e) = graph.drive(&mut state, events).await {
            log::error!("Error running agent: {}", e);
        }
        state.tokens_used = chat.tokens_used();
        Ok(state)
    }

    /// Answer every unanswered example in a dataset
    pub async fn run_batch(&self, options: &BatchOptions) -> Result<BatchSummary> {
        let examples = load_examples(&options.dataset)?;
        let mut answers = load_answers(&options.answers)?;
        let answered: HashSet<String> = answers.iter().map(|a| a.id.clone()).collect();
        std::fs::create_dir_all(&options.logs_dir)?;

        let mut summary = BatchSummary::default();
        let total = examples.len();

        for (idx, example) in examples.into_iter().enumerate() {
            if answered.contains(&example.id) {
                summary.skipped += 1;
                continue;
            }
            log::info!(
                "=== Running Example {}/{}: ID={} ===",
                idx + 1,
                total,
                example.id
            );

            let state = match self.run(&example.question).await {
                Ok(state) => state,
                Err(e) => {
                    log::warn!("Example {} failed: {}", example.id, e);
                    summary.failed += 1;
                    continue;
                }
            };

            let log_path = options.logs_dir.join(format!("log_{}.txt", example.id));
            if let Err(e) = std::fs::write(&log_path, render_log(&state)) {
                log::warn!("Could not write {}: {}", log_path.display(), e);
            }

            summary.ran += 1;
            summary.total_tokens += state.tokens_used;
            answers.push(AnswerRecord {
                id: example.id,
                question: example.question,
                answer: answer_of(&state).to_string(),
                expected_answer: example.expected_answer,
                tokens_used: state.tokens_used,
            });
            save_answers(&answers, &options.answers)?;

            log::info!(
                "Tokens used: {}, Total tokens: {}",
                state.tokens_used,
                summary.total_tokens
            );
        }

        log::info!(
            "Batch run complete. Results saved to {}",
            options.answers.display()
        );
        Ok(summary)
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub dataset: PathBuf,
    pub answers: PathBuf,
    pub logs_dir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub ran: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_tokens: u64,
}

/// One dataset row; `answer` is the reference answer
#[derive(Debug, Clone, Deserialize)]
pub struct Example {
    #[serde(default, deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub question: String,
    #[serde(default, rename = "answer")]
    pub expected_answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub question: String,
    pub answer: String,
    pub expected_answer: String,
    #[serde(default)]
    pub tokens_used: u64,
}

/// Dataset ids may be numbers or strings
fn id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

pub fn load_examples(path: &Path) -> Result<Vec<Example>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn load_answers(path: &Path) -> Result<Vec<AnswerRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn save_answers(answers: &[AnswerRecord], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(answers)?)?;
    Ok(())
}

fn render_log(state: &AgentState) -> String {
    let mut out = format!("Task: {}\n\n", state.task);
    for (i, entry) in state.log.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, entry));
    }
    out.push_str(&format!(
        "\nFinal Answer: {}\nTokens used: {}\n",
        answer_of(state),
        state.tokens_used
    ));
    out
}
