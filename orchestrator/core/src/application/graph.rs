// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # DAG Scheduler
//!
//! Executes [`GraphNode`]s level by level. Nodes inside one topological level
//! run concurrently unless the options ask for sequential execution. Each
//! worker completes into its own slot; the scheduling loop alone writes the
//! shared result map, in declaration order, so results never depend on which
//! worker finished first.

use crate::application::invoke::invoke_agent;
use crate::domain::agent::{AgentInputs, AgentResult, Payload};
use crate::domain::events::GraphEvent;
use crate::domain::graph::{
    topological_levels, validate_nodes, GraphError, GraphNode, GraphNodeResult, GraphOptions,
    GraphResult, GraphValidation, NodeStatus,
};
use crate::domain::run::{RunId, RunStatus};
use crate::domain::slush::{Slush, UpstreamSlush};
use crate::infrastructure::event_bus::EventBus;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct AgentGraph {
    nodes: Vec<GraphNode>,
    options: GraphOptions,
    event_bus: Option<Arc<EventBus>>,
}

impl AgentGraph {
    pub fn new(options: GraphOptions) -> Self {
        Self {
            nodes: Vec::new(),
            options,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Register a node. Names must be unique within the graph.
    pub fn add_node(&mut self, node: GraphNode) -> Result<&mut Self, GraphError> {
        if self.nodes.iter().any(|existing| existing.name == node.name) {
            return Err(GraphError::DuplicateNode(node.name));
        }
        self.nodes.push(node);
        Ok(self)
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|node| node.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn options(&self) -> &GraphOptions {
        &self.options
    }

    pub fn validate(&self) -> GraphValidation {
        validate_nodes(&self.nodes)
    }

    /// Validate, then execute every node level by level.
    ///
    /// Fails only on validation errors, before any agent runs. Node failures
    /// surface as `partial` (or `error` under `stop_on_error`) in the result.
    pub async fn run(&self, initial: Option<Payload>) -> Result<GraphResult, GraphError> {
        let validation = self.validate();
        if !validation.valid {
            warn!(errors = ?validation.errors, "Graph validation failed");
            return Err(GraphError::Validation(validation.errors));
        }

        let run_id = RunId::new();
        let started = Instant::now();
        let levels = topological_levels(&self.nodes);
        let by_name: HashMap<&str, &GraphNode> = self
            .nodes
            .iter()
            .map(|node| (node.name.as_str(), node))
            .collect();

        info!(
            run_id = %run_id,
            nodes = self.nodes.len(),
            levels = levels.len(),
            "Starting graph run"
        );
        self.publish(GraphEvent::GraphStarted {
            run_id,
            node_count: self.nodes.len(),
            level_count: levels.len(),
            started_at: Utc::now(),
        });

        let mut results: HashMap<String, GraphNodeResult> = HashMap::with_capacity(self.nodes.len());
        let mut execution_order = Vec::with_capacity(self.nodes.len());
        let mut halted: Option<String> = None;
        let sequential = self.options.stop_on_error || !self.options.parallel;

        for level in &levels {
            let level_nodes: Vec<&GraphNode> = level
                .iter()
                .filter_map(|name| by_name.get(name.as_str()).copied())
                .collect();

            if halted.is_some() {
                for node in level_nodes {
                    self.record_skipped(run_id, node, &mut results, &mut execution_order);
                }
                continue;
            }

            let mut runnable = Vec::with_capacity(level_nodes.len());
            for node in level_nodes {
                if has_unhealthy_dependency(node, &results) {
                    self.record_skipped(run_id, node, &mut results, &mut execution_order);
                } else {
                    runnable.push(node);
                }
            }

            if sequential || runnable.len() == 1 {
                for (position, node) in runnable.iter().enumerate() {
                    let inputs = build_inputs(node, initial.as_ref(), &results);
                    let result = self.execute_node(run_id, node, inputs).await;
                    let failure = result.error.clone().filter(|_| result.status == NodeStatus::Error);

                    execution_order.push(node.name.clone());
                    results.insert(node.name.clone(), result);

                    if let (Some(message), true) = (failure, self.options.stop_on_error) {
                        warn!(run_id = %run_id, node = %node.name, "Stopping graph after node failure");
                        halted = Some(message);
                        for rest in &runnable[position + 1..] {
                            self.record_skipped(run_id, rest, &mut results, &mut execution_order);
                        }
                        break;
                    }
                }
            } else {
                // Inputs are built up front; workers never touch `results`
                let mut pending: FuturesUnordered<_> = runnable
                    .iter()
                    .enumerate()
                    .map(|(slot, node)| {
                        let inputs = build_inputs(node, initial.as_ref(), &results);
                        async move { (slot, self.execute_node(run_id, node, inputs).await) }
                    })
                    .collect();

                let mut slots: Vec<Option<GraphNodeResult>> = runnable.iter().map(|_| None).collect();
                while let Some((slot, result)) = pending.next().await {
                    slots[slot] = Some(result);
                }
                drop(pending);

                for result in slots.into_iter().flatten() {
                    execution_order.push(result.name.clone());
                    results.insert(result.name.clone(), result);
                }
            }
        }

        let status = if halted.is_some() {
            RunStatus::Error
        } else if results
            .values()
            .any(|result| result.status != NodeStatus::Success)
        {
            RunStatus::Partial
        } else {
            RunStatus::Success
        };

        let total_duration_ms = started.elapsed().as_millis() as u64;
        metrics::histogram!("conductor_graph_duration_ms").record(total_duration_ms as f64);
        info!(
            run_id = %run_id,
            status = %status,
            duration_ms = total_duration_ms,
            "Graph run finished"
        );
        self.publish(GraphEvent::GraphCompleted {
            run_id,
            status,
            total_duration_ms,
            completed_at: Utc::now(),
        });

        Ok(GraphResult {
            run_id,
            status,
            nodes: results,
            execution_order,
            total_duration_ms,
            error: halted,
        })
    }

    async fn execute_node(&self, run_id: RunId, node: &GraphNode, inputs: AgentInputs) -> GraphNodeResult {
        debug!(run_id = %run_id, node = %node.name, agent = %node.agent.name(), "Dispatching graph node");
        let started = Instant::now();
        let outcome = invoke_agent(node.agent.as_ref(), inputs, self.options.node_timeout, "Node").await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            AgentResult::Success(output) => {
                let slush = output.slush.unwrap_or_else(|| {
                    Slush::placeholder(
                        node.agent.name(),
                        [
                            ("node_name", json!(node.name)),
                            ("node_result_status", json!(NodeStatus::Success.as_str())),
                        ],
                    )
                });
                self.publish(GraphEvent::NodeCompleted {
                    run_id,
                    node: node.name.clone(),
                    duration_ms,
                    completed_at: Utc::now(),
                });
                GraphNodeResult {
                    name: node.name.clone(),
                    agent_name: node.agent.name().to_string(),
                    status: NodeStatus::Success,
                    payload: Some(output.payload),
                    error: None,
                    slush: Some(slush),
                    duration_ms,
                }
            }
            AgentResult::Error(failure) => {
                warn!(run_id = %run_id, node = %node.name, error = %failure.message, "Graph node failed");
                self.publish(GraphEvent::NodeFailed {
                    run_id,
                    node: node.name.clone(),
                    error: failure.message.clone(),
                    failed_at: Utc::now(),
                });
                GraphNodeResult {
                    name: node.name.clone(),
                    agent_name: node.agent.name().to_string(),
                    status: NodeStatus::Error,
                    payload: None,
                    error: Some(failure.message),
                    slush: failure.slush,
                    duration_ms,
                }
            }
        };

        metrics::counter!("conductor_graph_nodes_total", "status" => result.status.as_str()).increment(1);
        metrics::histogram!("conductor_graph_node_duration_ms").record(duration_ms as f64);
        result
    }

    fn record_skipped(
        &self,
        run_id: RunId,
        node: &GraphNode,
        results: &mut HashMap<String, GraphNodeResult>,
        execution_order: &mut Vec<String>,
    ) {
        debug!(run_id = %run_id, node = %node.name, "Skipping graph node");
        metrics::counter!("conductor_graph_nodes_total", "status" => NodeStatus::Skipped.as_str()).increment(1);
        self.publish(GraphEvent::NodeSkipped {
            run_id,
            node: node.name.clone(),
            skipped_at: Utc::now(),
        });
        results.insert(
            node.name.clone(),
            GraphNodeResult::skipped(&node.name, node.agent.name()),
        );
        execution_order.push(node.name.clone());
    }

    fn publish(&self, event: GraphEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish_graph_event(event);
        }
    }
}

impl Default for AgentGraph {
    fn default() -> Self {
        Self::new(GraphOptions::default())
    }
}

/// A dependency that failed or was itself skipped poisons the node.
fn has_unhealthy_dependency(node: &GraphNode, results: &HashMap<String, GraphNodeResult>) -> bool {
    node.depends_on.iter().any(|dep| {
        results
            .get(dep)
            .map_or(false, |result| result.status != NodeStatus::Success)
    })
}

/// Root nodes get the initial inputs, which static inputs override.
/// Dependency slush is merged into one map keyed by producer name.
fn build_inputs(
    node: &GraphNode,
    initial: Option<&Payload>,
    results: &HashMap<String, GraphNodeResult>,
) -> AgentInputs {
    let mut inputs = AgentInputs::default();
    if node.is_root() {
        if let Some(initial) = initial {
            inputs.merge(initial);
        }
    }
    inputs.merge(&node.inputs);

    let upstream: BTreeMap<String, Slush> = node
        .depends_on
        .iter()
        .filter_map(|dep| {
            results
                .get(dep)
                .and_then(|result| result.slush.clone())
                .map(|slush| (dep.clone(), slush))
        })
        .collect();
    if !upstream.is_empty() {
        inputs.upstream_slush = Some(UpstreamSlush::Merged(upstream));
    }

    inputs
}
