// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pipeline Domain Types
//!
//! Declarations and results for the sequential agent pipeline. The executor
//! lives in [`crate::application::chain`].

use crate::domain::agent::{Agent, Payload};
use crate::domain::run::{RunId, RunStatus};
use crate::domain::slush::Slush;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Maps the previous step's payload and carried slush to extra inputs for the
/// next step.
pub type StepTransform = Arc<dyn Fn(&Payload, Option<&Slush>) -> Payload + Send + Sync>;

/// Chain-wide execution policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainOptions {
    /// Halt at the first failing step (default: true)
    #[serde(default = "default_stop_on_error")]
    pub stop_on_error: bool,

    /// Time budget applied to every step without its own override
    #[serde(default, with = "humantime_serde")]
    pub step_timeout: Option<Duration>,
}

fn default_stop_on_error() -> bool {
    true
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            stop_on_error: true,
            step_timeout: None,
        }
    }
}

/// One named step wrapping a single agent call.
#[derive(Clone)]
pub struct ChainStep {
    pub name: String,
    pub agent: Arc<dyn Agent>,
    pub inputs: Payload,
    pub transform: Option<StepTransform>,
    pub timeout: Option<Duration>,
}

impl ChainStep {
    pub fn new(name: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        Self {
            name: name.into(),
            agent,
            inputs: Payload::new(),
            transform: None,
            timeout: None,
        }
    }

    pub fn with_inputs(mut self, inputs: Payload) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&Payload, Option<&Slush>) -> Payload + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Override the chain-wide step timeout for this step only.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for ChainStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainStep")
            .field("name", &self.name)
            .field("agent", &self.agent.name())
            .field("inputs", &self.inputs)
            .field("transform", &self.transform.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Outcome of a single executed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStepResult {
    pub name: String,
    pub agent_name: String,
    pub status: StepStatus,
    pub payload: Option<Payload>,
    pub error: Option<String>,
    /// Slush carried forward after this step
    pub slush: Option<Slush>,
    pub duration_ms: u64,
}

/// Aggregate outcome of a chain run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResult {
    pub run_id: RunId,
    pub status: RunStatus,
    /// Executed steps, in declared order
    pub steps: Vec<ChainStepResult>,
    pub total_duration_ms: u64,
    /// Payload of the last successful step (`None` for an empty chain)
    pub final_result: Option<Payload>,
    pub final_slush: Option<Slush>,
    /// Name of the step that halted the chain (only with status `error`)
    pub failed_step: Option<String>,
    pub error: Option<String>,
}

impl ChainResult {
    /// First step result recorded under `name`.
    pub fn step(&self, name: &str) -> Option<&ChainStepResult> {
        self.steps.iter().find(|step| step.name == name)
    }
}
