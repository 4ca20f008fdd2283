// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Invocation Contract
//!
//! The kernel depends on exactly one capability: an [`Agent`] that accepts
//! [`AgentInputs`] and produces an [`AgentResult`]. What an agent *does* is
//! opaque; pipelines, graphs, broadcast groups and the recursion guard only
//! sequence, parallelize and gate calls to it.

use crate::domain::slush::{Slush, UpstreamSlush};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// JSON object carried as agent inputs and success payloads.
pub type Payload = Map<String, Value>;

/// Inputs handed to a single agent call.
///
/// `upstream_slush` is kept apart from `params` so upstream signals never
/// collide with caller-supplied keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentInputs {
    #[serde(default)]
    pub params: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_slush: Option<UpstreamSlush>,
}

impl AgentInputs {
    pub fn new(params: Payload) -> Self {
        Self {
            params,
            upstream_slush: None,
        }
    }

    pub fn with_upstream(mut self, upstream: UpstreamSlush) -> Self {
        self.upstream_slush = Some(upstream);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Overlay `other` onto the current params; keys in `other` win.
    pub fn merge(&mut self, other: &Payload) {
        for (key, value) in other {
            self.params.insert(key.clone(), value.clone());
        }
    }
}

/// Successful agent outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    #[serde(default)]
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slush: Option<Slush>,
}

/// Failed agent outcome. A failing agent may still emit slush; broadcast
/// fallback forwards it to the next target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFailure {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slush: Option<Slush>,
}

/// Tagged outcome of one agent call. Exactly one variant is ever populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentResult {
    Success(AgentOutput),
    Error(AgentFailure),
}

impl AgentResult {
    pub fn success(payload: Payload) -> Self {
        Self::Success(AgentOutput {
            payload,
            slush: None,
        })
    }

    pub fn success_with_slush(payload: Payload, slush: Slush) -> Self {
        Self::Success(AgentOutput {
            payload,
            slush: Some(slush),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(AgentFailure {
            message: message.into(),
            slush: None,
        })
    }

    pub fn error_with_slush(message: impl Into<String>, slush: Slush) -> Self {
        Self::Error(AgentFailure {
            message: message.into(),
            slush: Some(slush),
        })
    }

    /// Failure recorded when a call exceeds its time budget.
    pub fn timed_out(label: &str, timeout: Duration) -> Self {
        Self::error(format!("{} timeout after {}ms", label, timeout.as_millis()))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Slush emitted by the agent, regardless of outcome.
    pub fn slush(&self) -> Option<&Slush> {
        match self {
            Self::Success(output) => output.slush.as_ref(),
            Self::Error(failure) => failure.slush.as_ref(),
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Success(output) => Some(&output.payload),
            Self::Error(_) => None,
        }
    }

    /// Error message, if this is a failure.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Error(failure) => Some(&failure.message),
        }
    }

    pub fn into_result(self) -> Result<AgentOutput, AgentFailure> {
        match self {
            Self::Success(output) => Ok(output),
            Self::Error(failure) => Err(failure),
        }
    }
}

/// An opaque unit of work the kernel can sequence and gate.
///
/// Implementations must not assume shared mutable state between calls; every
/// call is independent.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Display name recorded on step and node results.
    fn name(&self) -> &str;

    async fn execute(&self, inputs: AgentInputs) -> AgentResult;
}
