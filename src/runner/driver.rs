//! Agent driver abstraction: the seam between the engine and the LLM
//! harness that actually runs agents.

use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// What an agent is being asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Hunter,
    Referee,
    Verifier,
    Reviewer,
}

/// One agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub game_id: String,
    /// Competitor agent id for hunter/reviewer runs; a role label for
    /// referee and verifier runs.
    pub agent_id: String,
    pub role: AgentRole,
    pub prompt: String,
}

/// Token accounting for one or many agent invocations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Terminal result of one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub agent_id: String,
    /// True when the run was cancelled, timed out, or failed.
    pub aborted: bool,
    pub reason: Option<String>,
    pub usage: TokenUsage,
}

impl AgentOutcome {
    pub fn completed(agent_id: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            agent_id: agent_id.into(),
            aborted: false,
            reason: None,
            usage,
        }
    }

    pub fn aborted(agent_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            aborted: true,
            reason: Some(reason.into()),
            usage: TokenUsage::default(),
        }
    }
}

/// Runs agents against the LLM backend.
///
/// Implementations act on the game exclusively through the
/// [`crate::submission::SubmissionService`] (the prompt tells the agent
/// which tools to call); the engine never parses model output. Cancellation
/// is advisory: implementations must watch `cancel` and abort their
/// in-flight LLM call when it fires.
#[async_trait]
pub trait AgentDriver: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn run_agent(&self, run: AgentRun, cancel: CancellationToken) -> Result<AgentOutcome>;
}
