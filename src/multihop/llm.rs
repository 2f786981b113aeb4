// SPDX-License-Identifier: MIT

//! Chat helper used by every node
//!
//! Wraps a [`Model`] with the run's sampling settings, strips reasoning
//! preambles, and turns structured replies into typed values. Transport and
//! parse failures degrade to text instead of aborting the run.

use once_cell::sync::Lazy;
use regex::Regex;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::adk::model::{Content, GenerationConfig, Model};

/// Placeholder in system prompts replaced by format instructions
pub const FORMAT_PLACEHOLDER: &str = "{format_instructions}";

static THINK_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?si).*(?:</\s*think\s*>|<\\\s*think\s*>)\s*").expect("valid regex"));

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[a-zA-Z]*\s*\n?(.*?)```").expect("valid regex"));

/// Drop everything up to and including the last closing think tag
///
/// Accepts `</think>` and the `<\think>` typo; also unwraps a reply that is
/// wholly enclosed in matching quotes.
pub fn strip_think(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let mut s = s;
    let quoted = s.len() >= 2
        && (s.starts_with('"') && s.ends_with('"') || s.starts_with('\'') && s.ends_with('\''));
    if quoted {
        s = &s[1..s.len() - 1];
    }
    THINK_PREFIX.replace(s, "").trim().to_string()
}

/// Leniently pull a JSON value out of model text
///
/// Tries the whole text, then the first fenced block, then the outermost
/// `{...}` span.
pub fn parse_json_lenient<T: DeserializeOwned>(text: &str) -> Option<T> {
    let text = text.trim();
    if let Ok(v) = serde_json::from_str(text) {
        return Some(v);
    }
    if let Some(block) = FENCED_BLOCK.captures(text).and_then(|c| c.get(1)) {
        if let Ok(v) = serde_json::from_str(block.as_str().trim()) {
            return Some(v);
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Format instructions describing the JSON shape of `T`
pub struct OutputFormat<T> {
    instructions: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: JsonSchema> OutputFormat<T> {
    pub fn new() -> Self {
        let schema = serde_json::to_string(&schema_for!(T)).unwrap_or_default();
        let instructions = format!(
            "The output should be formatted as a JSON instance that conforms to the JSON schema below.\n\
             Return only the JSON object, without commentary.\n\n```\n{}\n```",
            schema
        );
        Self {
            instructions,
            _marker: PhantomData,
        }
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }
}

impl<T: JsonSchema> Default for OutputFormat<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A structured reply, or the cleaned text when it would not parse
#[derive(Debug, Clone, PartialEq)]
pub enum Structured<T> {
    Parsed(T),
    Raw(String),
}

/// Model handle plus per-run sampling settings and token accounting
#[derive(Clone)]
pub struct Chat {
    model: Arc<dyn Model>,
    config: GenerationConfig,
    tokens: Arc<AtomicU64>,
}

impl Chat {
    pub fn new(model: Arc<dyn Model>, config: GenerationConfig) -> Self {
        Self {
            model,
            config,
            tokens: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Same model, different sampling settings, token count starting at zero
    pub fn fork(&self, config: GenerationConfig) -> Self {
        Self::new(self.model.clone(), config)
    }

    pub fn config(&self) -> GenerationConfig {
        self.config
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Tokens reported by the provider so far
    pub fn tokens_used(&self) -> u64 {
        self.tokens.load(Ordering::Relaxed)
    }

    /// Plain completion with think tags removed
    ///
    /// Never fails: a model error comes back as an `Error: ...` string so the
    /// graph can keep going.
    pub async fn complete(&self, system: &str, user: &str) -> String {
        let system = system.replace(FORMAT_PLACEHOLDER, "");
        self.invoke(&system, user).await
    }

    /// Completion parsed into `T`, falling back to the cleaned text
    pub async fn structured<T>(&self, system: &str, user: &str, format: &OutputFormat<T>) -> Structured<T>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let system = system.replace(FORMAT_PLACEHOLDER, format.instructions());
        let cleaned = self.invoke(&system, user).await;
        match parse_json_lenient::<T>(&cleaned) {
            Some(v) => Structured::Parsed(v),
            None => {
                log::warn!("Structured parse failed, returning raw content");
                Structured::Raw(cleaned)
            }
        }
    }

    async fn invoke(&self, system: &str, user: &str) -> String {
        log::debug!("LLM call\nSystem: {}\nUser: {}", system, user);
        let history = [Content::system(system), Content::user(user)];

        match self.model.generate_content(&history, Some(&self.config)).await {
            Ok(response) => {
                if let Some(usage) = response.usage {
                    self.tokens.fetch_add(usage.total_tokens, Ordering::Relaxed);
                }
                let cleaned = strip_think(&response.text_content());
                log::debug!("LLM response: {}", cleaned);
                cleaned
            }
            Err(e) => {
                log::error!("Error during LLM invocation: {}", e);
                format!("Error: Could not get response from LLM. {}", e)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Answer {
        answer: String,
    }

    #[test]
    fn test_strip_think_removes_up_to_last_tag() {
        assert_eq!(
            strip_think("<think>a</think> mid </think>\n  Final"),
            "Final"
        );
        assert_eq!(strip_think("<THINK>x</ Think >ok"), "ok");
        assert_eq!(strip_think(r"reasoning<\think>done"), "done");
        assert_eq!(strip_think("  no tags  "), "no tags");
        assert_eq!(strip_think(""), "");
    }

    #[test]
    fn test_strip_think_unwraps_quotes() {
        assert_eq!(strip_think("\"quoted\""), "quoted");
        assert_eq!(strip_think("'single'"), "single");
        assert_eq!(strip_think("\"mismatched'"), "\"mismatched'");
    }

    #[test]
    fn test_parse_json_lenient_variants() {
        let direct: Option<Answer> = parse_json_lenient(r#"{"answer": "Paris"}"#);
        assert_eq!(direct.unwrap().answer, "Paris");

        let fenced: Option<Answer> =
            parse_json_lenient("Sure:\n```json\n{\"answer\": \"Lagos\"}\n```\nDone.");
        assert_eq!(fenced.unwrap().answer, "Lagos");

        let embedded: Option<Answer> =
            parse_json_lenient(r#"Here you go {"answer": "Cairo"} hope it helps"#);
        assert_eq!(embedded.unwrap().answer, "Cairo");

        let none: Option<Answer> = parse_json_lenient("no json } here {");
        assert!(none.is_none());
    }

    #[test]
    fn test_output_format_mentions_fields() {
        let format = OutputFormat::<Answer>::new();
        assert!(format.instructions().contains("\"answer\""));
        assert!(format.instructions().contains("JSON schema"));
    }

    #[tokio::test]
    async fn test_structured_parses_and_counts_tokens() {
        let model = ScriptedModel::new(&[r#"<think>hmm</think>{"answer": "42"}"#]);
        let chat = chat(model.clone());

        let out = chat
            .structured("Sys {format_instructions}", "Q", &OutputFormat::<Answer>::new())
            .await;

        assert_eq!(
            out,
            Structured::Parsed(Answer {
                answer: "42".to_string()
            })
        );
        assert_eq!(chat.tokens_used(), 10);
        assert!(model.last_system().contains("JSON schema"));
        assert!(!model.last_system().contains(FORMAT_PLACEHOLDER));
    }

    #[tokio::test]
    async fn test_fork_resets_token_count() {
        let model = ScriptedModel::new(&["one", "two"]);
        let first = chat(model);
        first.complete("S", "Q").await;

        let second = first.fork(GenerationConfig::sampling(0.5, 0.9, 10));
        second.complete("S", "Q").await;

        assert_eq!(first.tokens_used(), 10);
        assert_eq!(second.tokens_used(), 10);
    }

    #[tokio::test]
    async fn test_structured_falls_back_to_raw() {
        let model = ScriptedModel::new(&["just prose"]);
        let out = chat(model)
            .structured("Sys", "Q", &OutputFormat::<Answer>::new())
            .await;
        assert_eq!(out, Structured::Raw("just prose".to_string()));
    }

    #[tokio::test]
    async fn test_complete_turns_model_error_into_text() {
        let model = ScriptedModel::failing("503 unavailable");
        let out = chat(model.clone()).complete("Sys {format_instructions}", "Q").await;
        assert!(out.starts_with("Error: Could not get response from LLM."));
        assert!(out.contains("503 unavailable"));
        assert_eq!(model.last_system(), "Sys ");
    }
}
