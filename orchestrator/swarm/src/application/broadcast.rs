// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Broadcast Coordinator
//!
//! Registry of [`BroadcastGroup`]s and the fan-out logic for the three
//! delivery modes. How an agent id resolves to a running agent is left to the
//! caller-supplied [`BroadcastExecutor`].

use crate::domain::broadcast::{
    BroadcastError, BroadcastGroup, BroadcastMode, BroadcastResponse, BroadcastResult,
};
use async_trait::async_trait;
use chrono::Utc;
use conductor_core::application::invoke::panic_message;
use conductor_core::domain::agent::AgentResult;
use conductor_core::domain::events::BroadcastEvent;
use conductor_core::domain::kernel_config::BroadcastSettings;
use conductor_core::domain::slush::Slush;
use conductor_core::infrastructure::event_bus::EventBus;
use futures::FutureExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Delivers one message to one agent.
///
/// `upstream_slush` is only ever set in fallback mode, carrying the slush a
/// failed earlier target emitted.
#[async_trait]
pub trait BroadcastExecutor: Send + Sync {
    async fn execute(
        &self,
        agent_id: &str,
        message: &str,
        upstream_slush: Option<Slush>,
    ) -> AgentResult;
}

pub struct BroadcastManager {
    groups: RwLock<HashMap<String, BroadcastGroup>>,
    default_timeout: Option<Duration>,
    event_bus: Option<Arc<EventBus>>,
}

impl BroadcastManager {
    pub fn new() -> Self {
        Self::with_settings(&BroadcastSettings::default())
    }

    pub fn with_settings(settings: &BroadcastSettings) -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            default_timeout: settings.default_timeout,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Register a group, replacing any group with the same id.
    /// Register a group, replacing any group with the same id. Repeated
    /// target ids are dropped so each agent is called at most once.
    pub fn create_group(&self, mut group: BroadcastGroup) {
        let removed = group.dedup_targets();
        if !removed.is_empty() {
            warn!(group_id = %group.id, removed = ?removed, "Dropped repeated broadcast targets");
        }
        let id = group.id.clone();
        if self.groups.write().insert(id.clone(), group).is_some() {
            debug!(group_id = %id, "Replaced broadcast group");
        }
    }

    pub fn remove_group(&self, group_id: &str) -> bool {
        self.groups.write().remove(group_id).is_some()
    }

    pub fn get_group(&self, group_id: &str) -> Option<BroadcastGroup> {
        self.groups.read().get(group_id).cloned()
    }

    /// All registered groups, ordered by id.
    pub fn groups(&self) -> Vec<BroadcastGroup> {
        let mut groups: Vec<BroadcastGroup> = self.groups.read().values().cloned().collect();
        groups.sort_by(|a, b| a.id.cmp(&b.id));
        groups
    }

    /// Send `message` to every target of the group according to its mode.
    ///
    /// Fails only when the group does not exist, before any agent is invoked.
    pub async fn broadcast(
        &self,
        group_id: &str,
        message: &str,
        executor: Arc<dyn BroadcastExecutor>,
    ) -> Result<BroadcastResult, BroadcastError> {
        let group = self
            .get_group(group_id)
            .ok_or_else(|| BroadcastError::GroupNotFound(group_id.to_string()))?;
        let timeout = group.timeout.or(self.default_timeout);
        let started = Instant::now();

        info!(
            group_id = %group.id,
            mode = %group.mode,
            targets = group.agent_ids.len(),
            "Broadcasting message"
        );
        self.publish(BroadcastEvent::BroadcastStarted {
            group_id: group.id.clone(),
            mode: group.mode.to_string(),
            target_count: group.agent_ids.len(),
            started_at: Utc::now(),
        });

        let result = match group.mode {
            BroadcastMode::All => broadcast_all(&group, message, executor, timeout).await,
            BroadcastMode::Race => broadcast_race(&group, message, executor, timeout).await,
            BroadcastMode::Fallback => broadcast_fallback(&group, message, executor, timeout).await,
        };

        let outcome = if result.all_succeeded {
            "all_succeeded"
        } else if result.any_succeeded {
            "some_succeeded"
        } else {
            "none_succeeded"
        };
        metrics::counter!(
            "conductor_broadcast_total",
            "mode" => group.mode.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!("conductor_broadcast_duration_ms", "mode" => group.mode.as_str())
            .record(started.elapsed().as_millis() as f64);

        info!(
            group_id = %group.id,
            winner = ?result.winner(),
            any_succeeded = result.any_succeeded,
            all_succeeded = result.all_succeeded,
            "Broadcast finished"
        );
        self.publish(BroadcastEvent::BroadcastCompleted {
            group_id: group.id.clone(),
            mode: group.mode.to_string(),
            any_succeeded: result.any_succeeded,
            all_succeeded: result.all_succeeded,
            completed_at: Utc::now(),
        });

        Ok(result)
    }

    fn publish(&self, event: BroadcastEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish_broadcast_event(event);
        }
    }
}

impl Default for BroadcastManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn call_target(
    executor: &dyn BroadcastExecutor,
    agent_id: &str,
    message: &str,
    upstream_slush: Option<Slush>,
    timeout: Option<Duration>,
) -> AgentResult {
    let call = AssertUnwindSafe(executor.execute(agent_id, message, upstream_slush)).catch_unwind();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(outcome) => outcome,
            Err(_) => return AgentResult::timed_out("Broadcast", limit),
        },
        None => call.await,
    };

    outcome.unwrap_or_else(|panic| {
        AgentResult::error(format!(
            "Agent \"{}\" panicked: {}",
            agent_id,
            panic_message(panic.as_ref())
        ))
    })
}

/// Spawn one task per target, returning the task-id to agent-id mapping.
fn spawn_targets(
    group: &BroadcastGroup,
    message: &str,
    executor: &Arc<dyn BroadcastExecutor>,
    timeout: Option<Duration>,
) -> (JoinSet<(String, AgentResult)>, HashMap<tokio::task::Id, String>) {
    let mut tasks = JoinSet::new();
    let mut owners = HashMap::with_capacity(group.agent_ids.len());

    for agent_id in &group.agent_ids {
        let executor = Arc::clone(executor);
        let agent_id_owned = agent_id.clone();
        let message = message.to_string();
        let handle = tasks.spawn(async move {
            let result =
                call_target(executor.as_ref(), &agent_id_owned, &message, None, timeout).await;
            (agent_id_owned, result)
        });
        owners.insert(handle.id(), agent_id.clone());
    }

    (tasks, owners)
}

async fn broadcast_all(
    group: &BroadcastGroup,
    message: &str,
    executor: Arc<dyn BroadcastExecutor>,
    timeout: Option<Duration>,
) -> BroadcastResult {
    let (mut tasks, owners) = spawn_targets(group, message, &executor, timeout);
    let mut results = HashMap::with_capacity(group.agent_ids.len());
    let mut first_response = None;

    // join_next yields in completion order, so the first success seen is the earliest
    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((_, (agent_id, result))) => {
                if !result.is_success() {
                    warn!(group_id = %group.id, agent_id = %agent_id, error = ?result.message(), "Broadcast target failed");
                }
                if first_response.is_none() && result.is_success() {
                    first_response = Some(BroadcastResponse {
                        agent_id: agent_id.clone(),
                        result: result.clone(),
                    });
                }
                results.insert(agent_id, result);
            }
            Err(e) => {
                let agent_id = owners.get(&e.id()).cloned().unwrap_or_default();
                warn!(group_id = %group.id, agent_id = %agent_id, "Broadcast target task failed: {}", e);
                results.insert(agent_id, AgentResult::error(format!("Broadcast task failed: {}", e)));
            }
        }
    }

    BroadcastResult::from_outcomes(group, results, first_response)
}

async fn broadcast_race(
    group: &BroadcastGroup,
    message: &str,
    executor: Arc<dyn BroadcastExecutor>,
    timeout: Option<Duration>,
) -> BroadcastResult {
    let (mut tasks, owners) = spawn_targets(group, message, &executor, timeout);
    let mut results = HashMap::with_capacity(group.agent_ids.len());
    let mut first_response: Option<BroadcastResponse> = None;

    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((_, (agent_id, result))) => {
                if first_response.is_none() && result.is_success() {
                    debug!(group_id = %group.id, agent_id = %agent_id, "Race won; cancelling remaining targets");
                    first_response = Some(BroadcastResponse {
                        agent_id: agent_id.clone(),
                        result: result.clone(),
                    });
                    tasks.abort_all();
                }
                results.insert(agent_id, result);
            }
            // Losers aborted after the winner leave no outcome
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                let agent_id = owners.get(&e.id()).cloned().unwrap_or_default();
                warn!(group_id = %group.id, agent_id = %agent_id, "Broadcast target task failed: {}", e);
                results.insert(agent_id, AgentResult::error(format!("Broadcast task failed: {}", e)));
            }
        }
    }

    BroadcastResult::from_outcomes(group, results, first_response)
}

async fn broadcast_fallback(
    group: &BroadcastGroup,
    message: &str,
    executor: Arc<dyn BroadcastExecutor>,
    timeout: Option<Duration>,
) -> BroadcastResult {
    let mut results = HashMap::with_capacity(group.agent_ids.len());
    let mut first_response = None;
    let mut carried: Option<Slush> = None;

    for agent_id in &group.agent_ids {
        let result = call_target(
            executor.as_ref(),
            agent_id,
            message,
            carried.clone(),
            timeout,
        )
        .await;

        if result.is_success() {
            first_response = Some(BroadcastResponse {
                agent_id: agent_id.clone(),
                result: result.clone(),
            });
            results.insert(agent_id.clone(), result);
            break;
        }

        warn!(
            group_id = %group.id,
            agent_id = %agent_id,
            error = ?result.message(),
            "Fallback target failed, trying next"
        );
        // A failure without slush keeps whatever an earlier failure emitted
        if let Some(slush) = result.slush() {
            carried = Some(slush.clone());
        }
        results.insert(agent_id.clone(), result);
    }

    BroadcastResult::from_outcomes(group, results, first_response)
}
