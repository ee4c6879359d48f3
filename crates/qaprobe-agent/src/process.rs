//! Subprocess-based agent runtime.
//!
//! Runs the external browser-agent binary once per invocation: task on
//! stdin, credential in the provider's environment variable, step history
//! as JSON on stdout. The spawned browser session is scoped to the call.

use crate::{AgentError, AgentHistory, AgentInvocation, AgentRuntime, validate_credential};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Default name of the agent binary, resolved via PATH.
const DEFAULT_AGENT_BINARY: &str = "browser-agent";

/// Agent runtime that shells out to the browser-agent binary.
#[derive(Debug, Clone)]
pub struct ProcessAgentRuntime {
    binary: PathBuf,
}

impl ProcessAgentRuntime {
    /// Creates a runtime for the given binary path.
    ///
    /// If `binary` is None, "browser-agent" is resolved from PATH.
    pub fn new(binary: Option<PathBuf>) -> Self {
        Self {
            binary: binary.unwrap_or_else(|| PathBuf::from(DEFAULT_AGENT_BINARY)),
        }
    }

    fn build_command(&self, invocation: &AgentInvocation) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("run")
            .args(["--provider", invocation.provider.as_str()])
            .args(["--model", &invocation.model])
            .args(["--max-steps", &invocation.max_steps.to_string()])
            .args([
                "--window-size",
                &format!(
                    "{}x{}",
                    invocation.browser.window_width, invocation.browser.window_height
                ),
            ])
            .args(["--user-agent", &invocation.browser.user_agent]);

        if invocation.browser.headless {
            command.arg("--headless");
        }

        if let (Some(var), Some(credential)) = (
            invocation.provider.credential_env_var(),
            invocation.credential.as_deref(),
        ) {
            command.env(var, credential);
        }

        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        command
    }
}

impl Default for ProcessAgentRuntime {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl AgentRuntime for ProcessAgentRuntime {
    async fn run(&self, invocation: AgentInvocation) -> Result<AgentHistory, AgentError> {
        validate_credential(invocation.provider, invocation.credential.as_deref())?;

        tracing::info!(
            provider = %invocation.provider,
            model = %invocation.model,
            max_steps = invocation.max_steps,
            "Invoking browser agent"
        );

        let mut child = self
            .build_command(&invocation)
            .spawn()
            .map_err(|e| AgentError::ExecutionFailed(e.to_string()))?;

        // The task prompt goes on stdin; closing it signals EOF.
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(invocation.task.as_bytes())
                .await
                .map_err(|e| AgentError::ExecutionFailed(e.to_string()))?;
            drop(stdin);
        }

        // No timeout here: a hung agent hangs this call (see controller
        // docs). Cancellation happens only between invocations.
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AgentError::ExecutionFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::ExecutionFailed(format!(
                "agent exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| AgentError::ExecutionFailed(format!("undecodable agent history: {e}")))
    }
}
