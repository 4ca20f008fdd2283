// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Sub-Agent Manager
//!
//! Gates and records agents invoking other agents. Every invocation passes the
//! depth, block-list, allow-list and loop checks before the caller-supplied
//! [`SubAgentExecutor`] runs; agent failures are recorded and handed back to
//! the caller, never retried or swallowed.

use crate::domain::subagent::{
    parse_tool_name, CallStatus, SubAgentCall, SubAgentConfig, SubAgentContext, SubAgentError,
    TOOL_PREFIX,
};
use async_trait::async_trait;
use chrono::Utc;
use conductor_core::application::invoke::panic_message;
use conductor_core::domain::agent::{AgentOutput, AgentResult};
use conductor_core::domain::events::SubAgentEvent;
use conductor_core::domain::slush::Slush;
use conductor_core::infrastructure::event_bus::EventBus;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default number of entries returned by [`SubAgentManager::call_history`] callers.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Runs the target agent of a sub-agent call.
///
/// `context` is the child context (one level deeper, history extended with
/// this call), so a target may itself invoke further sub-agents through the
/// same manager. `upstream_slush` is the caller's last sub-call slush.
#[async_trait]
pub trait SubAgentExecutor: Send + Sync {
    async fn execute(
        &self,
        agent_id: &str,
        message: &str,
        context: SubAgentContext,
        upstream_slush: Option<Slush>,
    ) -> AgentResult;
}

/// OpenAI function-calling tool descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object
    pub parameters: Value,
}

pub struct SubAgentManager {
    config: SubAgentConfig,
    executor: RwLock<Option<Arc<dyn SubAgentExecutor>>>,
    active_calls: Mutex<HashMap<String, SubAgentCall>>,
    call_history: Mutex<Vec<SubAgentCall>>,
    event_bus: Option<Arc<EventBus>>,
}

impl SubAgentManager {
    pub fn new(config: SubAgentConfig) -> Self {
        Self {
            config,
            executor: RwLock::new(None),
            active_calls: Mutex::new(HashMap::new()),
            call_history: Mutex::new(Vec::new()),
            event_bus: None,
        }
    }

    pub fn with_executor(self, executor: Arc<dyn SubAgentExecutor>) -> Self {
        self.set_executor(executor);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Install or replace the executor. Takes `&self` so an executor can hold
    /// a handle to this manager for nested calls.
    pub fn set_executor(&self, executor: Arc<dyn SubAgentExecutor>) {
        *self.executor.write() = Some(executor);
    }

    pub fn config(&self) -> &SubAgentConfig {
        &self.config
    }

    pub fn can_invoke(&self, agent_id: &str, depth: u32) -> bool {
        self.config.can_invoke(agent_id, depth)
    }

    pub fn create_context(&self, root_agent_id: &str) -> SubAgentContext {
        SubAgentContext::root(root_agent_id)
    }

    /// Invoke `target_agent_id` on behalf of the caller described by `context`.
    ///
    /// On success the target's slush (if any) becomes `context.last_slush`, so
    /// the caller's next sub-call receives it.
    pub async fn invoke(
        &self,
        target_agent_id: &str,
        message: &str,
        context: &mut SubAgentContext,
    ) -> Result<AgentOutput, SubAgentError> {
        let executor = self
            .executor
            .read()
            .clone()
            .ok_or(SubAgentError::NoExecutor)?;

        if let Err(e) = self
            .config
            .check(target_agent_id, context.depth)
            .and_then(|_| self.config.check_loop(target_agent_id, &context.history))
        {
            warn!(
                agent_id = %target_agent_id,
                parent_agent_id = %context.parent_agent_id,
                depth = context.depth,
                "Sub-agent call rejected: {}",
                e
            );
            metrics::counter!("conductor_subagent_calls_total", "status" => "rejected").increment(1);
            self.publish(SubAgentEvent::CallRejected {
                agent_id: target_agent_id.to_string(),
                parent_agent_id: context.parent_agent_id.clone(),
                depth: context.depth,
                reason: e.to_string(),
                rejected_at: Utc::now(),
            });
            return Err(e);
        }

        let mut call = SubAgentCall::new(
            context.parent_agent_id.clone(),
            target_agent_id,
            message,
            context.depth,
        );
        let call_id = call.id.clone();
        let child = context.child(&call);
        self.active_calls.lock().insert(call_id.clone(), call.clone());

        info!(
            call_id = %call_id,
            agent_id = %target_agent_id,
            parent_agent_id = %context.parent_agent_id,
            depth = context.depth,
            "Invoking sub-agent"
        );
        self.publish(SubAgentEvent::CallStarted {
            call_id: call_id.clone(),
            agent_id: target_agent_id.to_string(),
            parent_agent_id: context.parent_agent_id.clone(),
            depth: context.depth,
            started_at: call.started_at,
        });

        let outcome = self
            .dispatch(executor.as_ref(), target_agent_id, message, child, context.last_slush.clone())
            .await;

        match outcome {
            Ok(output) => {
                if let Some(slush) = &output.slush {
                    context.last_slush = Some(slush.clone());
                }
                call.complete();
                self.finish(call, CallStatus::Success.as_str());
                Ok(output)
            }
            Err(e) => {
                call.fail(e.to_string());
                let status = match e {
                    SubAgentError::Timeout { .. } => "timeout",
                    _ => CallStatus::Error.as_str(),
                };
                self.finish(call, status);
                Err(e)
            }
        }
    }

    async fn dispatch(
        &self,
        executor: &dyn SubAgentExecutor,
        target_agent_id: &str,
        message: &str,
        child: SubAgentContext,
        upstream_slush: Option<Slush>,
    ) -> Result<AgentOutput, SubAgentError> {
        let call = AssertUnwindSafe(executor.execute(target_agent_id, message, child, upstream_slush))
            .catch_unwind();

        let joined = match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                SubAgentError::Timeout {
                    agent_id: target_agent_id.to_string(),
                    timeout_ms: limit.as_millis() as u64,
                }
            })?,
            None => call.await,
        };

        let result = joined.unwrap_or_else(|panic| {
            AgentResult::error(format!(
                "Agent \"{}\" panicked: {}",
                target_agent_id,
                panic_message(panic.as_ref())
            ))
        });
        result.into_result().map_err(|failure| SubAgentError::AgentFailed {
            agent_id: target_agent_id.to_string(),
            message: failure.message,
            slush: failure.slush,
        })
    }

    /// Move a completed call from the active set into history.
    fn finish(&self, call: SubAgentCall, status_label: &'static str) {
        self.active_calls.lock().remove(&call.id);

        let duration_ms = call.duration_ms().unwrap_or(0);
        metrics::counter!("conductor_subagent_calls_total", "status" => status_label).increment(1);
        metrics::histogram!("conductor_subagent_call_duration_ms").record(duration_ms as f64);

        match call.status {
            CallStatus::Success => {
                debug!(call_id = %call.id, agent_id = %call.target_agent_id, duration_ms, "Sub-agent call completed");
                self.publish(SubAgentEvent::CallCompleted {
                    call_id: call.id.clone(),
                    agent_id: call.target_agent_id.clone(),
                    duration_ms,
                    completed_at: Utc::now(),
                });
            }
            _ => {
                let error = call.error.clone().unwrap_or_default();
                warn!(call_id = %call.id, agent_id = %call.target_agent_id, error = %error, "Sub-agent call failed");
                self.publish(SubAgentEvent::CallFailed {
                    call_id: call.id.clone(),
                    agent_id: call.target_agent_id.clone(),
                    error,
                    failed_at: Utc::now(),
                });
            }
        }

        self.call_history.lock().push(call);
    }

    /// Tool descriptor that lets a model invoke `agent_id` with a `message`.
    pub fn create_tool(&self, agent_id: &str, name: &str, description: &str) -> ToolDefinition {
        ToolDefinition {
            kind: "function".to_string(),
            function: FunctionDefinition {
                name: format!("{}{}", TOOL_PREFIX, agent_id),
                description: format!("Invoke the {} agent: {}", name, description),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "message": {
                            "type": "string",
                            "description": "The message/task to send to the agent",
                        },
                    },
                    "required": ["message"],
                }),
            },
        }
    }

    /// Route a tool call named `invoke_<agentId>` to [`Self::invoke`].
    pub async fn handle_tool_call(
        &self,
        tool_name: &str,
        args: &Map<String, Value>,
        context: &mut SubAgentContext,
    ) -> Result<AgentOutput, SubAgentError> {
        let agent_id = parse_tool_name(tool_name)?;
        let message = args
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| SubAgentError::MissingToolArgument {
                tool: tool_name.to_string(),
                argument: "message".to_string(),
            })?;

        self.invoke(agent_id, message, context).await
    }

    /// Calls currently in flight.
    pub fn active_calls(&self) -> Vec<SubAgentCall> {
        let mut calls: Vec<SubAgentCall> = self.active_calls.lock().values().cloned().collect();
        calls.sort_by_key(|call| call.started_at);
        calls
    }

    /// The most recent `limit` completed calls, oldest first.
    pub fn call_history(&self, limit: usize) -> Vec<SubAgentCall> {
        let history = self.call_history.lock();
        let start = history.len().saturating_sub(limit);
        history[start..].to_vec()
    }

    fn publish(&self, event: SubAgentEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish_subagent_event(event);
        }
    }
}

impl Default for SubAgentManager {
    fn default() -> Self {
        Self::new(SubAgentConfig::default())
    }
}
