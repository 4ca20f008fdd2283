// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Integration tests for the DAG scheduler
//!
//! Covers level ordering, upstream slush merging, transitive skip
//! propagation, stop-on-error aborts and validation failures.

use async_trait::async_trait;
use conductor_core::application::graph::AgentGraph;
use conductor_core::domain::agent::{Agent, AgentInputs, AgentResult, Payload};
use conductor_core::domain::graph::{GraphError, GraphNode, GraphOptions, NodeStatus};
use conductor_core::domain::run::RunStatus;
use conductor_core::domain::slush::UpstreamSlush;
use conductor_core::infrastructure::event_bus::{EventBus, KernelEvent};
use conductor_core::domain::events::GraphEvent;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Returns `{status: success, agent: <name>}` unless told to fail.
struct NamedAgent {
    name: String,
    fail: bool,
    delay: Duration,
    calls: AtomicUsize,
    upstream: Mutex<Option<UpstreamSlush>>,
}

impl NamedAgent {
    fn new(name: &str) -> Arc<Self> {
        Self::build(name, false, Duration::ZERO)
    }

    fn failing(name: &str) -> Arc<Self> {
        Self::build(name, true, Duration::ZERO)
    }

    fn slow(name: &str, delay: Duration) -> Arc<Self> {
        Self::build(name, false, delay)
    }

    fn build(name: &str, fail: bool, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail,
            delay,
            calls: AtomicUsize::new(0),
            upstream: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn upstream(&self) -> Option<UpstreamSlush> {
        self.upstream.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for NamedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, inputs: AgentInputs) -> AgentResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.upstream.lock().unwrap() = inputs.upstream_slush;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return AgentResult::error(format!("{} failed", self.name));
        }
        AgentResult::success(Payload::from_iter([
            ("status".to_string(), json!("success")),
            ("agent".to_string(), json!(self.name)),
        ]))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn position(order: &[String], name: &str) -> usize {
    order
        .iter()
        .position(|n| n == name)
        .unwrap_or_else(|| panic!("{name} missing from execution order"))
}

#[tokio::test]
async fn test_linear_graph_runs_in_order() {
    init_tracing();

    let mut graph = AgentGraph::default();
    graph
        .add_node(GraphNode::new("a", NamedAgent::new("a")))
        .unwrap()
        .add_node(GraphNode::new("b", NamedAgent::new("b")).depends_on(["a"]))
        .unwrap()
        .add_node(GraphNode::new("c", NamedAgent::new("c")).depends_on(["b"]))
        .unwrap();

    let result = graph.run(None).await.unwrap();

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.execution_order, vec!["a", "b", "c"]);
    assert_eq!(result.node("c").unwrap().payload.as_ref().unwrap()["agent"], json!("c"));
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_diamond_merges_upstream_slush_by_producer() {
    let sink = NamedAgent::new("sink");

    let mut graph = AgentGraph::default();
    graph
        .add_node(GraphNode::new("root", NamedAgent::new("root")))
        .unwrap()
        .add_node(GraphNode::new("left", NamedAgent::new("left")).depends_on(["root"]))
        .unwrap()
        .add_node(GraphNode::new("right", NamedAgent::new("right")).depends_on(["root"]))
        .unwrap()
        .add_node(GraphNode::new("sink", sink.clone()).depends_on(["left", "right"]))
        .unwrap();

    let result = graph.run(None).await.unwrap();
    assert_eq!(result.status, RunStatus::Success);

    let order = &result.execution_order;
    assert!(position(order, "root") < position(order, "left"));
    assert!(position(order, "root") < position(order, "right"));
    assert!(position(order, "left") < position(order, "sink"));
    assert!(position(order, "right") < position(order, "sink"));

    let upstream = sink.upstream().expect("sink received upstream slush");
    assert_eq!(upstream.producers(), vec!["left", "right"]);

    // Placeholder slush names the producing node
    let left = upstream.from_producer("left").unwrap();
    assert_eq!(left.get("signals").unwrap()["node_name"], json!("left"));
    assert_eq!(left.get("signals").unwrap()["node_result_status"], json!("success"));
}

#[tokio::test]
async fn test_failure_skips_dependents_transitively() {
    let child = NamedAgent::new("child");
    let grandchild = NamedAgent::new("grandchild");
    let sibling = NamedAgent::new("sibling");

    let mut graph = AgentGraph::default();
    graph
        .add_node(GraphNode::new("root", NamedAgent::new("root")))
        .unwrap()
        .add_node(GraphNode::new("broken", NamedAgent::failing("broken")).depends_on(["root"]))
        .unwrap()
        .add_node(GraphNode::new("sibling", sibling.clone()).depends_on(["root"]))
        .unwrap()
        .add_node(GraphNode::new("child", child.clone()).depends_on(["broken"]))
        .unwrap()
        .add_node(GraphNode::new("grandchild", grandchild.clone()).depends_on(["child", "sibling"]))
        .unwrap();

    let result = graph.run(None).await.unwrap();

    assert_eq!(result.status, RunStatus::Partial);
    assert_eq!(result.status_of("broken"), Some(NodeStatus::Error));
    assert_eq!(result.status_of("sibling"), Some(NodeStatus::Success));
    assert_eq!(result.status_of("child"), Some(NodeStatus::Skipped));
    assert_eq!(result.status_of("grandchild"), Some(NodeStatus::Skipped));
    assert_eq!(child.calls(), 0);
    assert_eq!(grandchild.calls(), 0);
    assert_eq!(sibling.calls(), 1);
    assert_eq!(result.execution_order.len(), 5);
}

#[tokio::test]
async fn test_stop_on_error_skips_everything_left() {
    let later = NamedAgent::new("later");
    let same_level = NamedAgent::new("same_level");

    let mut graph = AgentGraph::new(GraphOptions {
        stop_on_error: true,
        ..GraphOptions::default()
    });
    graph
        .add_node(GraphNode::new("first", NamedAgent::failing("first")))
        .unwrap()
        .add_node(GraphNode::new("same_level", same_level.clone()))
        .unwrap()
        .add_node(GraphNode::new("later", later.clone()).depends_on(["same_level"]))
        .unwrap();

    let result = graph.run(None).await.unwrap();

    assert_eq!(result.status, RunStatus::Error);
    assert_eq!(result.error.as_deref(), Some("first failed"));
    assert_eq!(result.status_of("same_level"), Some(NodeStatus::Skipped));
    assert_eq!(result.status_of("later"), Some(NodeStatus::Skipped));
    assert_eq!(same_level.calls(), 0);
    assert_eq!(later.calls(), 0);
    assert_eq!(result.execution_order, vec!["first", "same_level", "later"]);
}

#[tokio::test]
async fn test_execution_order_ignores_completion_race() {
    // "slow" is declared first but finishes last
    let mut graph = AgentGraph::default();
    graph
        .add_node(GraphNode::new("slow", NamedAgent::slow("slow", Duration::from_millis(60))))
        .unwrap()
        .add_node(GraphNode::new("fast", NamedAgent::new("fast")))
        .unwrap()
        .add_node(GraphNode::new("medium", NamedAgent::slow("medium", Duration::from_millis(20))))
        .unwrap();

    let result = graph.run(None).await.unwrap();
    assert_eq!(result.execution_order, vec!["slow", "fast", "medium"]);
}

#[tokio::test]
async fn test_level_runs_concurrently() {
    let mut graph = AgentGraph::default();
    for name in ["a", "b", "c", "d"] {
        graph
            .add_node(GraphNode::new(name, NamedAgent::slow(name, Duration::from_millis(200))))
            .unwrap();
    }

    let result = graph.run(None).await.unwrap();
    assert_eq!(result.status, RunStatus::Success);
    // Sequential execution would take at least 800ms
    assert!(result.total_duration_ms < 700, "took {}ms", result.total_duration_ms);
}

#[tokio::test]
async fn test_node_timeout_fails_node() {
    let mut graph = AgentGraph::new(GraphOptions {
        node_timeout: Some(Duration::from_millis(30)),
        ..GraphOptions::default()
    });
    graph
        .add_node(GraphNode::new("stuck", NamedAgent::slow("stuck", Duration::from_secs(5))))
        .unwrap()
        .add_node(GraphNode::new("after", NamedAgent::new("after")).depends_on(["stuck"]))
        .unwrap();

    let result = graph.run(None).await.unwrap();
    let stuck = result.node("stuck").unwrap();
    assert_eq!(stuck.status, NodeStatus::Error);
    assert_eq!(stuck.error.as_deref(), Some("Node timeout after 30ms"));
    assert_eq!(result.status_of("after"), Some(NodeStatus::Skipped));
}

#[tokio::test]
async fn test_cycle_rejected_before_any_agent_runs() {
    let a = NamedAgent::new("a");
    let b = NamedAgent::new("b");

    let mut graph = AgentGraph::default();
    graph
        .add_node(GraphNode::new("a", a.clone()).depends_on(["b"]))
        .unwrap()
        .add_node(GraphNode::new("b", b.clone()).depends_on(["a"]))
        .unwrap();

    let validation = graph.validate();
    assert!(!validation.valid);
    assert!(validation.errors.iter().any(|e| e.contains("Cycle")));

    let err = graph.run(None).await.unwrap_err();
    match &err {
        GraphError::Validation(errors) => {
            let cycle = errors.iter().find(|e| e.contains("Cycle")).unwrap();
            assert!(cycle.contains('a') && cycle.contains('b'));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().starts_with("AgentGraph validation failed:"));
    assert_eq!(a.calls() + b.calls(), 0);
}

#[tokio::test]
async fn test_graph_events_are_published() {
    let bus = Arc::new(EventBus::new(64));
    let mut graph = AgentGraph::default().with_event_bus(bus.clone());
    graph
        .add_node(GraphNode::new("a", NamedAgent::failing("a")))
        .unwrap()
        .add_node(GraphNode::new("b", NamedAgent::new("b")).depends_on(["a"]))
        .unwrap();

    let mut receiver = bus.subscribe();
    let result = graph.run(None).await.unwrap();

    let mut skipped = Vec::new();
    let mut completed = false;
    while let Ok(event) = receiver.try_recv() {
        match event {
            KernelEvent::Graph(GraphEvent::NodeSkipped { node, .. }) => skipped.push(node),
            KernelEvent::Graph(GraphEvent::GraphCompleted { run_id, status, .. }) => {
                assert_eq!(run_id, result.run_id);
                assert_eq!(status, RunStatus::Partial);
                completed = true;
            }
            _ => {}
        }
    }
    assert_eq!(skipped, vec!["b".to_string()]);
    assert!(completed);
}
