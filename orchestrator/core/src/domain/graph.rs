// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # DAG Scheduler Domain Model
//!
//! Node declarations, results, and the pure graph algorithms the scheduler
//! relies on: dependency validation, three-color cycle detection and Kahn
//! level computation. Nothing in this module invokes an agent.
//!
//! # Invariants
//! - Node names are unique (enforced by the scheduler at add time)
//! - Every dependency names an existing node (enforced by [`validate_nodes`])
//! - The dependency relation is acyclic (enforced by [`validate_nodes`])

use crate::domain::agent::{Agent, Payload};
use crate::domain::run::{RunId, RunStatus};
use crate::domain::slush::Slush;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Declarations
// ============================================================================

/// Scheduler-wide execution policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphOptions {
    /// Abort the whole run at the first node failure (default: false)
    #[serde(default)]
    pub stop_on_error: bool,

    /// Run the nodes of a level concurrently (default: true)
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    /// Time budget applied to every node invocation
    #[serde(default, with = "humantime_serde")]
    pub node_timeout: Option<Duration>,
}

fn default_parallel() -> bool {
    true
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            stop_on_error: false,
            parallel: true,
            node_timeout: None,
        }
    }
}

/// A named unit of work with zero or more dependencies.
#[derive(Clone)]
pub struct GraphNode {
    pub name: String,
    pub agent: Arc<dyn Agent>,
    pub inputs: Payload,
    pub depends_on: Vec<String>,
}

impl GraphNode {
    pub fn new(name: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        Self {
            name: name.into(),
            agent,
            inputs: Payload::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_inputs(mut self, inputs: Payload) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Root nodes declare no dependencies and receive the run's initial inputs.
    pub fn is_root(&self) -> bool {
        self.depends_on.is_empty()
    }
}

impl std::fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphNode")
            .field("name", &self.name)
            .field("agent", &self.agent.name())
            .field("inputs", &self.inputs)
            .field("depends_on", &self.depends_on)
            .finish()
    }
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Success,
    Error,
    Skipped,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNodeResult {
    pub name: String,
    pub agent_name: String,
    pub status: NodeStatus,
    pub payload: Option<Payload>,
    pub error: Option<String>,
    pub slush: Option<Slush>,
    pub duration_ms: u64,
}

impl GraphNodeResult {
    /// Result for a node that was never invoked.
    pub fn skipped(name: &str, agent_name: &str) -> Self {
        Self {
            name: name.to_string(),
            agent_name: agent_name.to_string(),
            status: NodeStatus::Skipped,
            payload: None,
            error: None,
            slush: None,
            duration_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphResult {
    pub run_id: RunId,
    pub status: RunStatus,
    pub nodes: HashMap<String, GraphNodeResult>,
    /// Nodes in level order, declaration order within a level
    pub execution_order: Vec<String>,
    pub total_duration_ms: u64,
    pub error: Option<String>,
}

impl GraphResult {
    pub fn node(&self, name: &str) -> Option<&GraphNodeResult> {
        self.nodes.get(name)
    }

    pub fn status_of(&self, name: &str) -> Option<NodeStatus> {
        self.nodes.get(name).map(|result| result.status)
    }
}

/// Outcome of [`validate_nodes`]; `errors` lists every problem found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

// ============================================================================
// Domain Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("AgentGraph: duplicate node name \"{0}\"")]
    DuplicateNode(String),

    #[error("AgentGraph validation failed:\n{}", .0.join("\n"))]
    Validation(Vec<String>),
}

// ============================================================================
// Graph Algorithms
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Check every dependency exists and the dependency relation is acyclic.
///
/// Missing dependencies are reported first, one error per edge, then every
/// cycle found by a three-color DFS, named by the actual nodes on it.
pub fn validate_nodes(nodes: &[GraphNode]) -> GraphValidation {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.name.as_str(), i))
        .collect();

    let mut errors = Vec::new();

    for node in nodes {
        for dep in &node.depends_on {
            if !index.contains_key(dep.as_str()) {
                errors.push(format!(
                    "Node \"{}\" depends on \"{}\", which does not exist",
                    node.name, dep
                ));
            }
        }
    }

    let mut colors = vec![Color::White; nodes.len()];
    let mut stack = Vec::new();
    for start in 0..nodes.len() {
        if colors[start] == Color::White {
            visit(start, nodes, &index, &mut colors, &mut stack, &mut errors);
        }
    }

    GraphValidation {
        valid: errors.is_empty(),
        errors,
    }
}

fn visit(
    current: usize,
    nodes: &[GraphNode],
    index: &HashMap<&str, usize>,
    colors: &mut [Color],
    stack: &mut Vec<usize>,
    errors: &mut Vec<String>,
) {
    colors[current] = Color::Gray;
    stack.push(current);

    for dep in &nodes[current].depends_on {
        // Missing targets were reported above
        let Some(&next) = index.get(dep.as_str()) else {
            continue;
        };
        match colors[next] {
            Color::Gray => {
                // `next` is on the stack, so the back edge closes a cycle
                let start = stack.iter().position(|&i| i == next).unwrap_or(0);
                let path: Vec<&str> = stack[start..]
                    .iter()
                    .chain(std::iter::once(&next))
                    .map(|&i| nodes[i].name.as_str())
                    .collect();
                errors.push(format!("Cycle detected: {}", path.join(" → ")));
            }
            Color::White => visit(next, nodes, index, colors, stack, errors),
            Color::Black => {}
        }
    }

    stack.pop();
    colors[current] = Color::Black;
}

/// Peel the graph into topological levels with Kahn's algorithm.
///
/// In-degrees count only edges to existing nodes. Each level is ordered by
/// declaration, so the result is deterministic. Nodes on a cycle never reach
/// in-degree zero and are left out; callers validate first.
pub fn topological_levels(nodes: &[GraphNode]) -> Vec<Vec<String>> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.name.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];

    for (i, node) in nodes.iter().enumerate() {
        for dep in &node.depends_on {
            if let Some(&d) = index.get(dep.as_str()) {
                in_degree[i] += 1;
                dependents[d].push(i);
            }
        }
    }

    let mut levels = Vec::new();
    let mut current: Vec<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();

    while !current.is_empty() {
        let mut next = Vec::new();
        for &i in &current {
            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    next.push(dependent);
                }
            }
        }
        next.sort_unstable();

        levels.push(current.iter().map(|&i| nodes[i].name.clone()).collect());
        current = next;
    }

    levels
}
