// SPDX-License-Identifier: MIT

//! Runtime configuration
//!
//! Settings are layered: built-in defaults, then an optional YAML file shaped
//! like the deployment secrets (`google.*`, `llm.*`, ...), then environment
//! variables.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::adk::error::{ConfigError, ModelError, MultiHopError, Result};
use crate::adk::model::gemini::GeminiModel;
use crate::adk::model::GenerationConfig;

/// Config file picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "multihop.yaml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub google: GoogleSettings,
    pub llm: LlmSettings,
    pub generation: GenerationSettings,
    pub agent: AgentSettings,
    pub coder: CoderSettings,
    pub usage: UsageSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    pub api_key: Option<String>,
    pub service_account_json: Option<String>,
    pub project_id: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
        }
    }
}

/// Default sampling tunables offered to users
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            top_p: 0.95,
            top_k: 40,
        }
    }
}

impl GenerationSettings {
    pub fn to_config(self) -> GenerationConfig {
        GenerationConfig::sampling(self.temperature, self.top_p, self.top_k)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Consecutive no-progress steps before the run is forced to finish
    pub stall_threshold: u32,
    /// Maximum node executions per run
    pub recursion_limit: u32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            stall_threshold: 3,
            recursion_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoderSettings {
    pub python: String,
    pub timeout_secs: u64,
}

impl Default for CoderSettings {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LimitPeriod {
    #[default]
    Lifetime,
    Monthly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageSettings {
    pub counter_file: PathBuf,
    pub max_requests: u64,
    pub period: LimitPeriod,
}

impl Default for UsageSettings {
    fn default() -> Self {
        Self {
            counter_file: PathBuf::from("request_counter.json"),
            max_requests: 1000,
            period: LimitPeriod::Lifetime,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8501,
        }
    }
}

/// Result of checking which Google credentials are configured
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CredentialStatus {
    pub ok: bool,
    pub missing: Vec<String>,
    pub message: String,
}

impl Settings {
    /// Load defaults, then the YAML file (explicit path or `multihop.yaml`
    /// when present), then process environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Reject agent limits that would end or skip every run
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let at_least_one = [
            ("agent.stall_threshold", self.agent.stall_threshold),
            ("agent.recursion_limit", self.agent.recursion_limit),
        ];
        for (name, value) in at_least_one {
            if value < 1 {
                return Err(ConfigError::Invalid {
                    name: name.to_string(),
                    message: format!("must be at least 1, got {}", value),
                });
            }
        }
        Ok(())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content).map_err(|e| {
            MultiHopError::from(ConfigError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })
        })
    }

    pub fn parse_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GOOGLE_API_KEY") {
            self.google.api_key = Some(v);
        }
        if let Some(v) = get("GOOGLE_CLOUD_PROJECT") {
            self.google.project_id = Some(v);
        }
        if let Some(v) = get("GOOGLE_CLOUD_LOCATION") {
            self.google.location = Some(v);
        }
        if let Some(v) = get("LLM_MODEL_NAME") {
            self.llm.model = v;
        }
        if let Some(v) = get("REQUEST_COUNTER_FILE") {
            self.usage.counter_file = PathBuf::from(v);
        }

        if self.google.service_account_json.is_none() {
            let creds_path =
                get("GOOGLE_APPLICATION_CREDENTIALS").or_else(|| get("GOOGLE_CREDENTIALS_PATH"));
            if let Some(p) = creds_path {
                match fs::read_to_string(&p) {
                    Ok(json) => self.google.service_account_json = Some(json),
                    Err(e) => log::warn!("Could not read credentials file {}: {}", p, e),
                }
            }
        }
    }

    /// Location with the regional default applied
    pub fn location(&self) -> &str {
        self.google.location.as_deref().unwrap_or("us-central1")
    }

    /// Report which of the deployment credentials are absent
    pub fn credentials_status(&self) -> CredentialStatus {
        let g = &self.google;
        let fields = [
            ("api_key", &g.api_key),
            ("service_account_json", &g.service_account_json),
            ("project_id", &g.project_id),
            ("location", &g.location),
        ];
        let missing: Vec<String> = fields
            .iter()
            .filter(|(_, v)| v.as_deref().map_or(true, |s| s.trim().is_empty()))
            .map(|(name, _)| name.to_string())
            .collect();

        if missing.is_empty() {
            CredentialStatus {
                ok: true,
                missing,
                message: "All credentials available".to_string(),
            }
        } else {
            let message = format!("Missing: {}", missing.join(", "));
            CredentialStatus {
                ok: false,
                missing,
                message,
            }
        }
    }

    /// Build the Gemini client described by these settings
    ///
    /// A configured project routes through Vertex AI; otherwise the
    /// Generative Language API is used.
    pub fn build_model(&self) -> std::result::Result<GeminiModel, ModelError> {
        let api_key = self
            .google
            .api_key
            .clone()
            .ok_or_else(|| ModelError::ApiKeyMissing("Gemini".to_string()))?;
        let model = GeminiModel::new(self.llm.model.clone(), api_key)?;
        Ok(match &self.google.project_id {
            Some(project) => model.with_vertex(project.clone(), self.location()),
            None => model,
        })
    }
}

/// Prefix injected into prompts so the model knows the current date
pub fn date_header() -> String {
    format!(
        "NOTE: Today's date is {}.\n\n",
        chrono::Local::now().format("%d-%m-%Y")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.llm.model, "gemini-2.5-flash");
        assert_eq!(s.generation.temperature, 0.1);
        assert_eq!(s.generation.top_p, 0.95);
        assert_eq!(s.generation.top_k, 40);
        assert_eq!(s.agent.stall_threshold, 3);
        assert_eq!(s.agent.recursion_limit, 100);
        assert_eq!(s.server.port, 8501);
        assert_eq!(s.usage.max_requests, 1000);
        assert_eq!(s.location(), "us-central1");
    }

    #[test]
    fn test_parse_secrets_shaped_yaml() {
        let yaml = r#"
google:
  api_key: abc
  project_id: my-proj
  location: europe-west1
llm:
  model: gemini-2.5-pro
agent:
  stall_threshold: 5
usage:
  period: monthly
  max_requests: 50
"#;
        let s = Settings::parse_yaml(yaml).unwrap();
        assert_eq!(s.google.api_key.as_deref(), Some("abc"));
        assert_eq!(s.google.project_id.as_deref(), Some("my-proj"));
        assert_eq!(s.llm.model, "gemini-2.5-pro");
        assert_eq!(s.agent.stall_threshold, 5);
        assert_eq!(s.agent.recursion_limit, 100);
        assert_eq!(s.usage.period, LimitPeriod::Monthly);
        assert_eq!(s.usage.max_requests, 50);
        assert_eq!(s.generation.top_k, 40);
    }

    #[test]
    fn test_validate_rejects_zero_stall_threshold() {
        let s = Settings::parse_yaml("agent:\n  stall_threshold: 0\n").unwrap();
        let err = s.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid setting agent.stall_threshold: must be at least 1, got 0"
        );

        let mut s = Settings::default();
        s.agent.recursion_limit = 0;
        assert!(s.validate().is_err());
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_load_rejects_zero_stall_threshold() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "agent:\n  stall_threshold: 0\n").unwrap();

        let err = Settings::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, MultiHopError::Config(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let s = Settings::parse_yaml("  \n").unwrap();
        assert_eq!(s.llm.model, "gemini-2.5-flash");
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut s = Settings::parse_yaml("llm:\n  model: from-file\n").unwrap();
        let vars = env(&[
            ("GOOGLE_API_KEY", "env-key"),
            ("GOOGLE_CLOUD_PROJECT", "env-proj"),
            ("GOOGLE_CLOUD_LOCATION", "asia-east1"),
            ("LLM_MODEL_NAME", "from-env"),
            ("REQUEST_COUNTER_FILE", "/tmp/counter.json"),
        ]);
        s.apply_env(|k| vars.get(k).cloned());

        assert_eq!(s.google.api_key.as_deref(), Some("env-key"));
        assert_eq!(s.google.project_id.as_deref(), Some("env-proj"));
        assert_eq!(s.location(), "asia-east1");
        assert_eq!(s.llm.model, "from-env");
        assert_eq!(s.usage.counter_file, PathBuf::from("/tmp/counter.json"));
    }

    #[test]
    fn test_blank_env_values_ignored() {
        let mut s = Settings::default();
        let vars = env(&[("LLM_MODEL_NAME", "  ")]);
        s.apply_env(|k| vars.get(k).cloned());
        assert_eq!(s.llm.model, "gemini-2.5-flash");
    }

    #[test]
    fn test_credentials_path_fills_service_account() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"project_id": "p"}}"#).unwrap();
        let path = file.path().display().to_string();

        let mut s = Settings::default();
        let vars = env(&[("GOOGLE_CREDENTIALS_PATH", path.as_str())]);
        s.apply_env(|k| vars.get(k).cloned());

        assert_eq!(
            s.google.service_account_json.as_deref(),
            Some(r#"{"project_id": "p"}"#)
        );
    }

    #[test]
    fn test_credentials_status_lists_missing() {
        let mut s = Settings::default();
        s.google.api_key = Some("k".to_string());
        s.google.location = Some("us-central1".to_string());

        let status = s.credentials_status();
        assert!(!status.ok);
        assert_eq!(status.missing, vec!["service_account_json", "project_id"]);
        assert_eq!(status.message, "Missing: service_account_json, project_id");
    }

    #[test]
    fn test_build_model_requires_key() {
        let s = Settings::default();
        assert!(matches!(
            s.build_model(),
            Err(ModelError::ApiKeyMissing(_))
        ));
    }

    #[test]
    fn test_build_model_uses_vertex_with_project() {
        let mut s = Settings::default();
        s.google.api_key = Some("k".to_string());
        s.google.project_id = Some("proj".to_string());
        let model = s.build_model().unwrap();
        assert!(model.request_url().contains("us-central1-aiplatform"));
    }

    #[test]
    fn test_date_header_shape() {
        let header = date_header();
        assert!(header.starts_with("NOTE: Today's date is "));
        assert!(header.ends_with(".\n\n"));
    }
}
