// SPDX-License-Identifier: MIT

//! Gemini Model - Google's Gemini API implementation
//!
//! Talks to either the Generative Language API or the Vertex AI
//! publisher-model endpoint; both accept the same `generateContent` body.

use super::{Content, GenerationConfig, Model, Part, TokenUsage};
use crate::adk::error::ModelError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

const GENERATIVE_LANGUAGE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Where requests are sent
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    /// generativelanguage.googleapis.com, keyed by API key
    GenerativeLanguage,
    /// Vertex AI publisher model in a project/location
    Vertex { project: String, location: String },
}

/// Google Gemini model implementation
pub struct GeminiModel {
    client: Client,
    api_key: String,
    model_name: String,
    endpoint: Endpoint,
    base_url: Option<String>,
}

impl GeminiModel {
    /// Create a new GeminiModel against the Generative Language API
    pub fn new(model_name: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ModelError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ModelError::ApiKeyMissing("Gemini".to_string()));
        }
        Ok(Self {
            client: Client::new(),
            api_key,
            model_name: model_name.into(),
            endpoint: Endpoint::GenerativeLanguage,
            base_url: None,
        })
    }

    /// Route requests through Vertex AI
    pub fn with_vertex(mut self, project: impl Into<String>, location: impl Into<String>) -> Self {
        self.endpoint = Endpoint::Vertex {
            project: project.into(),
            location: location.into(),
        };
        self
    }

    /// Override the API host (proxies, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    /// Full `generateContent` URL for the configured endpoint
    pub fn request_url(&self) -> String {
        match &self.endpoint {
            Endpoint::GenerativeLanguage => {
                let base = self.base_url.as_deref().unwrap_or(GENERATIVE_LANGUAGE_URL);
                format!(
                    "{}/models/{}:generateContent?key={}",
                    base, self.model_name, self.api_key
                )
            }
            Endpoint::Vertex { project, location } => {
                let base = self
                    .base_url
                    .clone()
                    .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com/v1", location));
                format!(
                    "{}/projects/{}/locations/{}/publishers/google/models/{}:generateContent?key={}",
                    base, project, location, self.model_name, self.api_key
                )
            }
        }
    }
}

#[async_trait]
impl Model for GeminiModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError> {
        let body = build_request_body(history, config);

        log::debug!(
            "Gemini request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(self.request_url())
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await?;
            return Err(ModelError::Http(format!(
                "Gemini API error ({}): {}",
                status, text
            )));
        }

        let resp_json: Value = resp.json().await?;
        log::debug!("Gemini response: {}", resp_json);

        parse_response(&resp_json)
    }
}

/// Build the `generateContent` body
///
/// System-role messages are folded into `systemInstruction`; thinking parts
/// are internal and never sent back.
pub fn build_request_body(history: &[Content], config: Option<&GenerationConfig>) -> Value {
    let mut system_texts = Vec::new();
    let mut contents = Vec::new();

    for c in history {
        let parts: Vec<Value> = c.parts.iter().filter_map(part_to_gemini_json).collect();
        if c.role == "system" {
            system_texts.extend(parts);
            continue;
        }
        if parts.is_empty() {
            continue;
        }
        contents.push(json!({ "role": c.role, "parts": parts }));
    }

    let mut body = json!({ "contents": contents });

    if !system_texts.is_empty() {
        body["systemInstruction"] = json!({ "parts": system_texts });
    }

    if let Some(cfg) = config {
        let mut gen = serde_json::Map::new();
        if let Some(t) = cfg.temperature {
            gen.insert("temperature".to_string(), json!(t));
        }
        if let Some(p) = cfg.top_p {
            gen.insert("topP".to_string(), json!(p));
        }
        if let Some(k) = cfg.top_k {
            gen.insert("topK".to_string(), json!(k));
        }
        if let Some(m) = cfg.max_output_tokens {
            gen.insert("maxOutputTokens".to_string(), json!(m));
        }
        if !gen.is_empty() {
            body["generationConfig"] = Value::Object(gen);
        }
    }

    body
}

/// Serialize a Part to Gemini API JSON format
/// Returns None for parts that shouldn't be sent (e.g., Thinking)
pub fn part_to_gemini_json(part: &Part) -> Option<Value> {
    match part {
        Part::Text(t) => Some(json!({ "text": t })),
        Part::Thinking(_) => None,
    }
}

/// Parse a Gemini API JSON part into Parts
pub fn parse_gemini_part(p: &Value) -> Vec<Part> {
    let mut parts = Vec::new();

    // Thinking models flag reasoning parts with `thought: true`, older
    // previews sent the reasoning text in `thought` directly
    let is_thought = p.get("thought").and_then(|t| t.as_bool()).unwrap_or(false);
    if let Some(thought) = p.get("thought").and_then(|t| t.as_str()) {
        if !thought.is_empty() {
            parts.push(Part::Thinking(thought.to_string()));
        }
    }

    if let Some(text) = p.get("text").and_then(|t| t.as_str()) {
        if is_thought {
            parts.push(Part::Thinking(text.to_string()));
        } else {
            parts.push(Part::Text(text.to_string()));
        }
    }

    parts
}

/// Parse a full `generateContent` response
pub fn parse_response(resp_json: &Value) -> Result<Content, ModelError> {
    let candidate = resp_json["candidates"]
        .as_array()
        .and_then(|c| c.first())
        .ok_or_else(|| {
            let reason = resp_json["promptFeedback"]["blockReason"]
                .as_str()
                .map(|r| format!(" (prompt blocked: {})", r))
                .unwrap_or_default();
            ModelError::InvalidResponse(format!("No candidates in response{}", reason))
        })?;

    if let Some(finish_reason) = candidate.get("finishReason").and_then(|v| v.as_str()) {
        log::debug!("Gemini finish reason: {}", finish_reason);
        if finish_reason == "SAFETY" || finish_reason == "PROHIBITED_CONTENT" {
            return Err(ModelError::Blocked(format!(
                "Gemini withheld the response ({})",
                finish_reason
            )));
        }
    }

    let parts_json = candidate["content"]["parts"].as_array().ok_or_else(|| {
        log::error!("No parts in candidate. Full response: {}", resp_json);
        ModelError::InvalidResponse(format!("No content parts in candidate: {}", candidate))
    })?;

    let parts = parts_json.iter().flat_map(parse_gemini_part).collect();

    let usage = resp_json.get("usageMetadata").map(|u| TokenUsage {
        prompt_tokens: u["promptTokenCount"].as_u64().unwrap_or(0),
        output_tokens: u["candidatesTokenCount"].as_u64().unwrap_or(0),
        total_tokens: u["totalTokenCount"].as_u64().unwrap_or(0),
    });

    Ok(Content {
        role: "model".to_string(),
        parts,
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_rejects_empty_key() {
        assert!(matches!(
            GeminiModel::new("gemini-2.5-flash", "  "),
            Err(ModelError::ApiKeyMissing(_))
        ));
    }

    #[test]
    fn test_generative_language_url() {
        let model = GeminiModel::new("gemini-2.5-flash", "k1").unwrap();
        assert_eq!(
            model.request_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent?key=k1"
        );
    }

    #[test]
    fn test_vertex_url() {
        let model = GeminiModel::new("gemini-2.5-flash", "k1")
            .unwrap()
            .with_vertex("proj", "europe-west4");
        assert_eq!(
            model.request_url(),
            "https://europe-west4-aiplatform.googleapis.com/v1/projects/proj/locations/europe-west4/publishers/google/models/gemini-2.5-flash:generateContent?key=k1"
        );
    }

    #[test]
    fn test_base_url_override() {
        let model = GeminiModel::new("m", "k")
            .unwrap()
            .with_base_url("http://localhost:9000/");
        assert_eq!(
            model.request_url(),
            "http://localhost:9000/models/m:generateContent?key=k"
        );
    }

    #[test]
    fn test_body_moves_system_to_instruction() {
        let history = [Content::system("be terse"), Content::user("hi")];
        let body = build_request_body(&history, None);

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be terse");
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["role"], "user");
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn test_body_carries_sampling() {
        let cfg = GenerationConfig::sampling(0.5, 0.9, 40);
        let body = build_request_body(&[Content::user("hi")], Some(&cfg));

        assert_eq!(body["generationConfig"]["temperature"], json!(0.5f32));
        assert_eq!(body["generationConfig"]["topP"], json!(0.9f32));
        assert_eq!(body["generationConfig"]["topK"], 40);
    }

    #[test]
    fn test_serialize_thinking_part_returns_none() {
        let part = Part::Thinking("Internal reasoning".to_string());
        assert!(part_to_gemini_json(&part).is_none());
    }

    #[test]
    fn test_parse_flagged_thought_part() {
        let parts = parse_gemini_part(&json!({ "text": "pondering", "thought": true }));
        assert_eq!(parts, vec![Part::Thinking("pondering".to_string())]);
    }

    #[test]
    fn test_parse_empty_thought_ignored() {
        let parts = parse_gemini_part(&json!({ "thought": "", "text": "Hello" }));
        assert_eq!(parts, vec![Part::Text("Hello".to_string())]);
    }

    #[test]
    fn test_parse_response_with_usage() {
        let resp = json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "42" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 10,
                "candidatesTokenCount": 2,
                "totalTokenCount": 12
            }
        });
        let content = parse_response(&resp).unwrap();
        assert_eq!(content.text_content(), "42");
        assert_eq!(content.usage.unwrap().total_tokens, 12);
    }

    #[test]
    fn test_parse_response_safety_block() {
        let resp = json!({ "candidates": [{ "finishReason": "SAFETY" }] });
        assert!(matches!(parse_response(&resp), Err(ModelError::Blocked(_))));
    }

    #[test]
    fn test_parse_response_without_candidates() {
        let resp = json!({ "promptFeedback": { "blockReason": "OTHER" } });
        let err = parse_response(&resp).unwrap_err();
        assert!(err.to_string().contains("prompt blocked: OTHER"));
    }
}
