// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Sub-Agent Invocation Guard
//!
//! Types for agents invoking other agents as tools:
//!
//! - [`SubAgentConfig`]: depth limit, allow/block lists, loop heuristic.
//! - [`SubAgentCall`]: record of one invocation.
//! - [`SubAgentContext`]: position of a caller in the invocation tree.
//!
//! # Invariants
//!
//! - A call is never dispatched at `depth >= max_depth`
//! - A blocked id is never dispatched, whatever the allow-list says
//! - Loop detection reads only the last `loop_window` history entries

use chrono::{DateTime, Utc};
use conductor_core::domain::kernel_config::SubAgentSettings;
use conductor_core::domain::slush::Slush;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Prefix of tool names produced for sub-agent invocation.
pub const TOOL_PREFIX: &str = "invoke_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAgentConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub max_depth: u32,
    /// Per-invocation time budget (None disables it)
    pub timeout: Option<Duration>,
    /// When set, only these ids may be invoked
    pub allowed_agents: Option<Vec<String>>,
    pub blocked_agents: Vec<String>,
    pub loop_window: usize,
    pub loop_threshold: usize,
}

impl Default for SubAgentConfig {
    fn default() -> Self {
        Self::from(&SubAgentSettings::default())
    }
}

impl From<&SubAgentSettings> for SubAgentConfig {
    fn from(settings: &SubAgentSettings) -> Self {
        Self {
            id: "subagent-manager".to_string(),
            name: "Sub-agent Manager".to_string(),
            description: "Manages sub-agent invocations".to_string(),
            max_depth: settings.max_depth,
            timeout: settings.timeout,
            allowed_agents: settings.allowed_agents.clone(),
            blocked_agents: settings.blocked_agents.clone(),
            loop_window: settings.loop_window,
            loop_threshold: settings.loop_threshold,
        }
    }
}

impl SubAgentConfig {
    /// Whether `agent_id` may be invoked from a caller at `depth`.
    pub fn can_invoke(&self, agent_id: &str, depth: u32) -> bool {
        self.check(agent_id, depth).is_ok()
    }

    /// Depth, block-list and allow-list checks, in that order.
    pub fn check(&self, agent_id: &str, depth: u32) -> Result<(), SubAgentError> {
        if depth >= self.max_depth {
            return Err(SubAgentError::DepthExceeded {
                agent_id: agent_id.to_string(),
                depth,
                max_depth: self.max_depth,
            });
        }

        if self.blocked_agents.iter().any(|blocked| blocked == agent_id) {
            return Err(SubAgentError::Blocked(agent_id.to_string()));
        }

        if let Some(allowed) = &self.allowed_agents {
            if !allowed.iter().any(|id| id == agent_id) {
                return Err(SubAgentError::NotAllowed(agent_id.to_string()));
            }
        }

        Ok(())
    }

    /// Reject a target that already appears `loop_threshold` times among the
    /// last `loop_window` calls of `history`.
    pub fn check_loop(&self, agent_id: &str, history: &[SubAgentCall]) -> Result<(), SubAgentError> {
        let window_start = history.len().saturating_sub(self.loop_window);
        let occurrences = history[window_start..]
            .iter()
            .filter(|call| call.target_agent_id == agent_id)
            .count();

        if occurrences >= self.loop_threshold {
            return Err(SubAgentError::RecursiveLoop(agent_id.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Running,
    Success,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAgentCall {
    pub id: String,
    pub parent_agent_id: String,
    pub target_agent_id: String,
    pub message: String,
    pub depth: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: CallStatus,
    pub error: Option<String>,
}

impl SubAgentCall {
    /// A fresh `running` record with a generated id.
    pub fn new(
        parent_agent_id: impl Into<String>,
        target_agent_id: impl Into<String>,
        message: impl Into<String>,
        depth: u32,
    ) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            parent_agent_id: parent_agent_id.into(),
            target_agent_id: target_agent_id.into(),
            message: message.into(),
            depth,
            started_at: Utc::now(),
            completed_at: None,
            status: CallStatus::Running,
            error: None,
        }
    }

    pub fn complete(&mut self) {
        self.status = CallStatus::Success;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = CallStatus::Error;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.completed_at
            .map(|done| (done - self.started_at).num_milliseconds().max(0) as u64)
    }
}

/// Where a caller sits in the invocation tree.
///
/// `history` holds the calls on the path from the root to this caller;
/// siblings do not see each other's calls. `last_slush` is the slush of this
/// caller's most recent successful sub-call, forwarded to the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAgentContext {
    pub call_id: String,
    pub parent_agent_id: String,
    pub depth: u32,
    pub history: Vec<SubAgentCall>,
    pub last_slush: Option<Slush>,
}

impl SubAgentContext {
    /// Context for a top-level caller: depth 0, empty history.
    pub fn root(parent_agent_id: impl Into<String>) -> Self {
        Self {
            call_id: format!("root_{}", Uuid::new_v4().simple()),
            parent_agent_id: parent_agent_id.into(),
            depth: 0,
            history: Vec::new(),
            last_slush: None,
        }
    }

    /// Context handed to the target of `call`, one level deeper.
    pub fn child(&self, call: &SubAgentCall) -> Self {
        let mut history = self.history.clone();
        history.push(call.clone());
        Self {
            call_id: call.id.clone(),
            parent_agent_id: call.target_agent_id.clone(),
            depth: self.depth + 1,
            history,
            last_slush: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubAgentError {
    #[error("No agent executor configured")]
    NoExecutor,

    #[error("Cannot invoke agent {agent_id}: depth={depth}, maxDepth={max_depth}")]
    DepthExceeded {
        agent_id: String,
        depth: u32,
        max_depth: u32,
    },

    #[error("Cannot invoke agent {0}: agent is blocked")]
    Blocked(String),

    #[error("Cannot invoke agent {0}: agent is not in the allowed list")]
    NotAllowed(String),

    #[error("Recursive loop detected: agent {0} called too many times")]
    RecursiveLoop(String),

    #[error("Sub-agent {agent_id} timeout after {timeout_ms}ms")]
    Timeout { agent_id: String, timeout_ms: u64 },

    #[error("Sub-agent {agent_id} failed: {message}")]
    AgentFailed {
        agent_id: String,
        message: String,
        slush: Option<Slush>,
    },

    #[error("Invalid sub-agent tool name: {0}")]
    InvalidToolName(String),

    #[error("Tool call {tool} is missing required string argument \"{argument}\"")]
    MissingToolArgument { tool: String, argument: String },
}

impl SubAgentError {
    /// Rejected by a guard rule before the executor was called.
    pub fn is_guard_rejection(&self) -> bool {
        matches!(
            self,
            Self::DepthExceeded { .. } | Self::Blocked(_) | Self::NotAllowed(_) | Self::RecursiveLoop(_)
        )
    }
}

/// Agent id encoded in a tool name of the form `invoke_<agentId>`.
pub fn parse_tool_name(tool_name: &str) -> Result<&str, SubAgentError> {
    match tool_name.strip_prefix(TOOL_PREFIX) {
        Some(agent_id) if !agent_id.is_empty() => Ok(agent_id),
        _ => Err(SubAgentError::InvalidToolName(tool_name.to_string())),
    }
}
