// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::run::{RunId, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChainEvent {
    ChainStarted {
        run_id: RunId,
        step_count: usize,
        started_at: DateTime<Utc>,
    },
    StepCompleted {
        run_id: RunId,
        step: String,
        agent_name: String,
        duration_ms: u64,
        completed_at: DateTime<Utc>,
    },
    StepFailed {
        run_id: RunId,
        step: String,
        agent_name: String,
        error: String,
        failed_at: DateTime<Utc>,
    },
    ChainCompleted {
        run_id: RunId,
        status: RunStatus,
        total_duration_ms: u64,
        completed_at: DateTime<Utc>,
    },
}

impl ChainEvent {
    pub fn run_id(&self) -> RunId {
        match self {
            Self::ChainStarted { run_id, .. }
            | Self::StepCompleted { run_id, .. }
            | Self::StepFailed { run_id, .. }
            | Self::ChainCompleted { run_id, .. } => *run_id,
        }
    }
}

/// DAG scheduler lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GraphEvent {
    GraphStarted {
        run_id: RunId,
        node_count: usize,
        level_count: usize,
        started_at: DateTime<Utc>,
    },
    NodeCompleted {
        run_id: RunId,
        node: String,
        duration_ms: u64,
        completed_at: DateTime<Utc>,
    },
    NodeFailed {
        run_id: RunId,
        node: String,
        error: String,
        failed_at: DateTime<Utc>,
    },
    NodeSkipped {
        run_id: RunId,
        node: String,
        skipped_at: DateTime<Utc>,
    },
    GraphCompleted {
        run_id: RunId,
        status: RunStatus,
        total_duration_ms: u64,
        completed_at: DateTime<Utc>,
    },
}

impl GraphEvent {
    pub fn run_id(&self) -> RunId {
        match self {
            Self::GraphStarted { run_id, .. }
            | Self::NodeCompleted { run_id, .. }
            | Self::NodeFailed { run_id, .. }
            | Self::NodeSkipped { run_id, .. }
            | Self::GraphCompleted { run_id, .. } => *run_id,
        }
    }
}

/// Broadcast coordinator events. `mode` is the lowercase mode name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BroadcastEvent {
    BroadcastStarted {
        group_id: String,
        mode: String,
        target_count: usize,
        started_at: DateTime<Utc>,
    },
    BroadcastCompleted {
        group_id: String,
        mode: String,
        any_succeeded: bool,
        all_succeeded: bool,
        completed_at: DateTime<Utc>,
    },
}

/// Recursion guard events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SubAgentEvent {
    CallStarted {
        call_id: String,
        agent_id: String,
        parent_agent_id: String,
        depth: u32,
        started_at: DateTime<Utc>,
    },
    CallCompleted {
        call_id: String,
        agent_id: String,
        duration_ms: u64,
        completed_at: DateTime<Utc>,
    },
    CallFailed {
        call_id: String,
        agent_id: String,
        error: String,
        failed_at: DateTime<Utc>,
    },
    /// Rejected by a depth, list or loop check before any executor call
    CallRejected {
        agent_id: String,
        parent_agent_id: String,
        depth: u32,
        reason: String,
        rejected_at: DateTime<Utc>,
    },
}
