// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Broadcast Groups
//!
//! A [`BroadcastGroup`] names a fixed list of target agent ids and a delivery
//! [`BroadcastMode`]. The coordinator in [`crate::application::broadcast`]
//! fans one message out to the group and folds every outcome into a
//! [`BroadcastResult`].

use conductor_core::domain::agent::AgentResult;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// How a message is delivered to the targets of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastMode {
    /// Every target concurrently; wait for all outcomes
    #[default]
    All,
    /// Every target concurrently; first success wins, the rest are cancelled
    Race,
    /// Targets one at a time in declared order until one succeeds
    Fallback,
}

impl BroadcastMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Race => "race",
            Self::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for BroadcastMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastGroup {
    pub id: String,
    pub name: String,
    /// Targets, in the order fallback mode tries them
    pub agent_ids: Vec<String>,
    #[serde(default)]
    pub mode: BroadcastMode,
    /// Per-call time budget; each target is timed independently
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl BroadcastGroup {
    pub fn new<I, S>(id: impl Into<String>, name: impl Into<String>, agent_ids: I, mode: BroadcastMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            agent_ids: agent_ids.into_iter().map(Into::into).collect(),
            mode,
            timeout: None,
        }
    }

    /// Drop repeated target ids, keeping the first occurrence. Returns the
    /// ids that were removed.
    pub fn dedup_targets(&mut self) -> Vec<String> {
        let mut seen = HashSet::with_capacity(self.agent_ids.len());
        let mut removed = Vec::new();
        self.agent_ids.retain(|id| {
            if seen.insert(id.clone()) {
                true
            } else {
                removed.push(id.clone());
                false
            }
        });
        removed
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// The winning (or earliest successful) target of a broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastResponse {
    pub agent_id: String,
    pub result: AgentResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastResult {
    pub group_id: String,
    /// Outcome per target that actually produced one
    pub results: HashMap<String, AgentResult>,
    pub first_response: Option<BroadcastResponse>,
    /// True only if every declared target succeeded; false for an empty group
    pub all_succeeded: bool,
    pub any_succeeded: bool,
}

impl BroadcastResult {
    /// Fold collected outcomes into the success flags.
    pub fn from_outcomes(
        group: &BroadcastGroup,
        results: HashMap<String, AgentResult>,
        first_response: Option<BroadcastResponse>,
    ) -> Self {
        let targets: HashSet<&str> = group.agent_ids.iter().map(String::as_str).collect();
        let successes = results.values().filter(|result| result.is_success()).count();
        Self {
            group_id: group.id.clone(),
            all_succeeded: !targets.is_empty() && successes == targets.len(),
            any_succeeded: successes > 0,
            results,
            first_response,
        }
    }

    pub fn result_for(&self, agent_id: &str) -> Option<&AgentResult> {
        self.results.get(agent_id)
    }

    /// Id of the winning target, if any.
    pub fn winner(&self) -> Option<&str> {
        self.first_response.as_ref().map(|response| response.agent_id.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    #[error("Broadcast group not found: {0}")]
    GroupNotFound(String),
}
