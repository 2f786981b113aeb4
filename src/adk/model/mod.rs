// SPDX-License-Identifier: MIT

//! Model module - defines LLM model trait and implementations
//!
//! This module provides the core Model trait and shared types.
//! Model implementations are in their own submodules:
//! - [gemini] - Google's Gemini API (Generative Language or Vertex AI)

pub mod gemini;

use crate::adk::error::{ConfigError, ModelError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for model generation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

impl GenerationConfig {
    /// Sampling settings with all three user tunables set
    pub fn sampling(temperature: f32, top_p: f32, top_k: u32) -> Self {
        Self {
            temperature: Some(temperature),
            top_p: Some(top_p),
            top_k: Some(top_k),
            max_output_tokens: None,
        }
    }

    /// Check every set tunable against its permitted range
    ///
    /// temperature: 0.0-2.0, top_p: 0.0-1.0, top_k: 1-100
    pub fn validated(self) -> Result<Self, ConfigError> {
        if let Some(t) = self.temperature {
            check_range("temperature", t as f64, 0.0, 2.0)?;
        }
        if let Some(p) = self.top_p {
            check_range("top_p", p as f64, 0.0, 1.0)?;
        }
        if let Some(k) = self.top_k {
            check_range("top_k", k as f64, 1.0, 100.0)?;
        }
        Ok(self)
    }
}

fn check_range(name: &str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_nan() || value < min || value > max {
        return Err(ConfigError::OutOfRange {
            name: name.to_string(),
            min,
            max,
            value,
        });
    }
    Ok(())
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl Content {
    pub fn system(text: impl Into<String>) -> Self {
        Self::text("system", text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text("user", text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::text("model", text)
    }

    fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![Part::Text(text.into())],
            usage: None,
        }
    }

    /// Concatenated text parts, thinking excluded
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Thinking(_) => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Parts of a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Part {
    /// Regular text output from the model
    Text(String),
    /// Thinking/reasoning content from thinking models (e.g., Gemini's thinking mode)
    Thinking(String),
}

/// Core trait for LLM model implementations
#[async_trait]
pub trait Model: Send + Sync {
    /// Human-readable model identifier
    fn name(&self) -> &str;

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validated_accepts_bounds() {
        assert!(GenerationConfig::sampling(0.0, 0.0, 1).validated().is_ok());
        assert!(GenerationConfig::sampling(2.0, 1.0, 100).validated().is_ok());
        assert!(GenerationConfig::default().validated().is_ok());
    }

    #[test]
    fn test_validated_rejects_out_of_range() {
        let err = GenerationConfig::sampling(2.1, 0.5, 40)
            .validated()
            .unwrap_err();
        assert!(err.to_string().starts_with("temperature"));

        let err = GenerationConfig::sampling(0.5, 1.5, 40)
            .validated()
            .unwrap_err();
        assert!(err.to_string().starts_with("top_p"));

        let err = GenerationConfig::sampling(0.5, 0.5, 0)
            .validated()
            .unwrap_err();
        assert!(err.to_string().starts_with("top_k"));

        assert!(GenerationConfig::sampling(f32::NAN, 0.5, 40)
            .validated()
            .is_err());
    }

    #[test]
    fn test_text_content_skips_thinking() {
        let content = Content {
            role: "model".to_string(),
            parts: vec![
                Part::Thinking("hmm".to_string()),
                Part::Text("Paris".to_string()),
                Part::Text(" is the capital".to_string()),
            ],
            usage: None,
        };
        assert_eq!(content.text_content(), "Paris is the capital");
    }
}
