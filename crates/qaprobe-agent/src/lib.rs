//! # qaprobe-agent
//!
//! Invoker for the external browser-driving agent. The agent itself (page
//! understanding, action selection, DOM interaction) lives in a separate
//! binary; this crate owns the boundary to it:
//! - LLM provider selection and eager credential validation
//! - the [`AgentRuntime`] trait for dependency injection in tests
//! - [`ProcessAgentRuntime`], which runs the agent binary as a subprocess
//!   and decodes its step history from stdout

mod process;

pub use process::ProcessAgentRuntime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Fixed user-agent string presented by the driven browser.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Supported LLM providers for the browser agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Google,
    #[serde(rename = "openai")]
    OpenAi,
    Groq,
    Ollama,
}

impl Provider {
    /// Canonical lowercase name, as used on the wire and in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::OpenAi => "openai",
            Provider::Groq => "groq",
            Provider::Ollama => "ollama",
        }
    }

    /// Whether this provider requires an API key. Ollama runs locally and
    /// is the sole exception.
    pub fn requires_credential(&self) -> bool {
        !matches!(self, Provider::Ollama)
    }

    /// Environment variable the agent binary reads the credential from.
    pub fn credential_env_var(&self) -> Option<&'static str> {
        match self {
            Provider::Google => Some("GOOGLE_API_KEY"),
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Groq => Some("GROQ_API_KEY"),
            Provider::Ollama => None,
        }
    }
}

impl FromStr for Provider {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Provider::Google),
            "openai" => Ok(Provider::OpenAi),
            "groq" => Ok(Provider::Groq),
            "ollama" => Ok(Provider::Ollama),
            other => Err(AgentError::UnsupportedProvider(other.to_string())),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from provider resolution and agent execution.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    /// Provider name outside the supported enumeration.
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Provider requires an API key and none was configured.
    #[error("{provider} requires an API key")]
    MissingCredential { provider: Provider },

    /// Any failure from the external agent binary (spawn, IO, non-zero
    /// exit, undecodable history). Wraps the underlying message.
    #[error("Agent execution failed: {0}")]
    ExecutionFailed(String),
}

/// Validates that a credential is present when the provider needs one.
///
/// Called eagerly at request time so missing keys surface as 4xx responses
/// before any background run starts.
pub fn validate_credential(provider: Provider, credential: Option<&str>) -> Result<(), AgentError> {
    if provider.requires_credential() && credential.map_or(true, |c| c.trim().is_empty()) {
        return Err(AgentError::MissingCredential { provider });
    }
    Ok(())
}

/// Browser session options passed through to the agent binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserOptions {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: String,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: false,
            window_width: 1920,
            window_height: 1080,
            user_agent: BROWSER_USER_AGENT.to_string(),
        }
    }
}

/// One request to the external agent: a natural-language task plus the
/// model client and browser session it should be bound to.
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    pub task: String,
    pub provider: Provider,
    pub model: String,
    pub credential: Option<String>,
    pub max_steps: u32,
    pub browser: BrowserOptions,
}

/// A single step in the agent's run history.
///
/// The agent binary emits more fields than these; only the ones the
/// orchestration layer consumes are decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStep {
    #[serde(default)]
    pub is_done: bool,
    #[serde(default)]
    pub long_term_memory: Option<String>,
}

/// Full step history returned by an agent run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentHistory {
    #[serde(default)]
    pub steps: Vec<AgentStep>,
}

impl AgentHistory {
    /// Narrative text of the last terminal step, or empty when the agent
    /// never reached a terminal step (e.g. step budget exhausted).
    pub fn final_narrative(&self) -> String {
        self.steps
            .iter()
            .rev()
            .find(|s| s.is_done)
            .and_then(|s| s.long_term_memory.clone())
            .unwrap_or_default()
    }
}

/// Trait for agent runtime implementations.
///
/// Allows injecting either the real [`ProcessAgentRuntime`] or a scripted
/// runtime in tests. The call is long-latency (seconds to minutes, bounded
/// loosely by `max_steps` times per-step latency) and cannot be interrupted
/// mid-flight; callers cancel only between invocations.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Runs the agent until it self-terminates or exhausts its step budget.
    async fn run(&self, invocation: AgentInvocation) -> Result<AgentHistory, AgentError>;
}
