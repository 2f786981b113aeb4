// SPDX-License-Identifier: MIT

//! Execution of model-written code snippets

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;

use crate::adk::error::ExecError;
use crate::multihop::config::CoderSettings;

/// Runs a code snippet and returns its textual output
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute(&self, code: &str) -> Result<String, ExecError>;
}

/// Runs Python through an interpreter subprocess
pub struct PythonExecutor {
    interpreter: String,
    timeout: Duration,
}

impl PythonExecutor {
    pub fn new(interpreter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
        }
    }

    pub fn from_settings(settings: &CoderSettings) -> Self {
        Self::new(
            settings.python.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    /// Removed when dropped, including when the run is cancelled
    fn scratch_dir() -> Result<TempDir, ExecError> {
        tempfile::Builder::new()
            .prefix("multihop-coder-")
            .tempdir()
            .map_err(|e| ExecError::SpawnFailed(format!("scratch dir: {}", e)))
    }
}

impl Default for PythonExecutor {
    fn default() -> Self {
        Self::from_settings(&CoderSettings::default())
    }
}

#[async_trait]
impl CodeExecutor for PythonExecutor {
    async fn execute(&self, code: &str) -> Result<String, ExecError> {
        let workdir = Self::scratch_dir()?;
        log::debug!("Executing code in {}:\n{}", workdir.path().display(), code);

        let child = Command::new(&self.interpreter)
            .arg("-c")
            .arg(code)
            .current_dir(workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::SpawnFailed(format!("{}: {}", self.interpreter, e)));

        let result = match child {
            Ok(child) => {
                match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
                    Ok(Ok(output)) => Ok(output),
                    Ok(Err(e)) => Err(ExecError::ProcessFailed(e.to_string())),
                    Err(_) => Err(ExecError::TimedOut {
                        timeout_secs: self.timeout.as_secs(),
                    }),
                }
            }
            Err(e) => Err(e),
        };

        if let Err(e) = workdir.close() {
            log::warn!("Failed to remove scratch dir: {}", e);
        }

        let output = result?;
        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        if output.status.success() {
            Ok(text.trim_end().to_string())
        } else {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            log::warn!("Code exited with {}", code);
            Ok(format!("Exit code {}\n{}", code, text.trim_end()))
        }
    }
}
