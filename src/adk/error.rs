// SPDX-License-Identifier: MIT

//! Typed error handling for multihop-rs
//!
//! One top-level error ([`MultiHopError`]) wraps the per-subsystem errors
//! so node, graph and server code can all use `?` against a single `Result`.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, MultiHopError>;

/// Top-level error type for multihop-rs
#[derive(Debug, Error)]
pub enum MultiHopError {
    /// Configuration errors (invalid settings, out-of-range tunables)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Model/LLM errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Graph construction errors
    #[error("Graph compile error: {0}")]
    Compile(#[from] CompileError),

    /// Graph execution errors
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Code execution errors
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Request usage limiting errors
    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Generic error wrapper for compatibility
    #[error("{0}")]
    Other(String),
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    /// Response withheld by the provider (safety filters etc.)
    #[error("Response blocked: {0}")]
    Blocked(String),

    /// Transport failure or non-success status
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A setting has a value the pipeline cannot run with
    #[error("Invalid setting {name}: {message}")]
    Invalid { name: String, message: String },

    /// A tunable is outside its permitted range
    #[error("{name} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        name: String,
        min: f64,
        max: f64,
        value: f64,
    },

    /// A configuration file could not be parsed
    #[error("Failed to parse config at {path}: {message}")]
    Parse { path: String, message: String },
}

/// Errors raised while compiling an agent graph
#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    /// No entry point was set
    #[error("Graph has no entry point")]
    MissingEntry,

    /// A referenced node was never added
    #[error("Node '{0}' is referenced but not registered")]
    UnknownNode(String),

    /// A node has no outgoing edge
    #[error("Node '{0}' has no outgoing edge")]
    Dangling(String),

    /// A node has both a static and a conditional edge
    #[error("Node '{0}' has both a static and a conditional edge")]
    AmbiguousEdges(String),
}

/// Errors raised while walking a compiled graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// Walk exceeded the step budget
    #[error("Recursion limit of {0} reached without hitting END")]
    RecursionLimit(u32),

    /// A node failed
    #[error("Node {node} failed: {message}")]
    Node { node: String, message: String },

    /// Routing resolved to a node that is not part of the graph
    #[error("Unknown node: {0}")]
    UnknownNode(String),
}

/// Errors related to code execution
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Failed to spawn interpreter: {0}")]
    SpawnFailed(String),

    #[error("Code timed out after {timeout_secs}s")]
    TimedOut { timeout_secs: u64 },

    #[error("Process execution failed: {0}")]
    ProcessFailed(String),
}

/// Errors from the request counter
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("Counter file {path} is unreadable: {message}")]
    Corrupt { path: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MultiHopError {
    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<&str> for MultiHopError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_message() {
        let err = ConfigError::OutOfRange {
            name: "temperature".to_string(),
            min: 0.0,
            max: 2.0,
            value: 2.5,
        };
        assert_eq!(err.to_string(), "temperature must be within [0, 2], got 2.5");
    }

    #[test]
    fn test_nested_errors_convert() {
        let err: MultiHopError = GraphError::RecursionLimit(100).into();
        assert!(matches!(err, MultiHopError::Graph(_)));
        assert!(err.to_string().contains("Recursion limit of 100"));

        let err: MultiHopError = "boom".into();
        assert_eq!(err.to_string(), "boom");
    }
}
