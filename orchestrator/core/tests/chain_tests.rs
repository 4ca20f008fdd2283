// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Integration tests for the sequential agent pipeline
//!
//! Covers slush forwarding between steps, stop-on-error halting,
//! continue-on-error partial runs and per-step timeouts.

use async_trait::async_trait;
use conductor_core::application::chain::AgentChain;
use conductor_core::domain::agent::{Agent, AgentInputs, AgentResult, Payload};
use conductor_core::domain::chain::{ChainOptions, ChainStep, StepStatus};
use conductor_core::domain::run::RunStatus;
use conductor_core::domain::slush::Slush;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Configurable mock agent that counts its calls and keeps the last inputs.
struct MockAgent {
    name: String,
    fail: bool,
    slush: Option<Slush>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_inputs: Mutex<Option<AgentInputs>>,
}

impl MockAgent {
    fn ok(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            slush: None,
            delay: None,
            calls: AtomicUsize::new(0),
            last_inputs: Mutex::new(None),
        }
    }

    fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::ok(name)
        }
    }

    fn emitting(mut self, slush: Slush) -> Self {
        self.slush = Some(slush);
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_inputs(&self) -> AgentInputs {
        self.last_inputs.lock().unwrap().clone().expect("agent was never called")
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, inputs: AgentInputs) -> AgentResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_inputs.lock().unwrap() = Some(inputs);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return AgentResult::error(format!("{} exploded", self.name));
        }

        let payload = Payload::from_iter([
            ("status".to_string(), json!("success")),
            ("agent".to_string(), json!(self.name)),
        ]);
        match &self.slush {
            Some(slush) => AgentResult::success_with_slush(payload, slush.clone()),
            None => AgentResult::success(payload),
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn signal(key: &str, value: serde_json::Value) -> Slush {
    Slush::from_iter([(key.to_string(), value)])
}

#[tokio::test]
async fn test_stop_on_error_halts_before_second_step() {
    init_tracing();

    let first = Arc::new(MockAgent::failing("first"));
    let second = Arc::new(MockAgent::ok("second"));

    let mut chain = AgentChain::new(ChainOptions::default());
    chain
        .add_step(ChainStep::new("fetch", first.clone()))
        .add_step(ChainStep::new("summarize", second.clone()));

    let result = chain.run(None).await;

    assert_eq!(result.status, RunStatus::Error);
    assert_eq!(result.failed_step.as_deref(), Some("fetch"));
    assert_eq!(result.error.as_deref(), Some("first exploded"));
    assert_eq!(result.steps.len(), 1);
    assert_eq!(first.calls(), 1);
    assert_eq!(second.calls(), 0, "second step must never be invoked");
}

#[tokio::test]
async fn test_continue_on_error_is_partial_and_keeps_slush() {
    let first = Arc::new(MockAgent::ok("first").emitting(signal("topic", json!("rust"))));
    let broken = Arc::new(MockAgent::failing("broken"));
    let last = Arc::new(MockAgent::ok("last"));

    let mut chain = AgentChain::new(ChainOptions {
        stop_on_error: false,
        ..ChainOptions::default()
    });
    chain
        .add_step(ChainStep::new("one", first))
        .add_step(ChainStep::new("two", broken.clone()))
        .add_step(ChainStep::new("three", last.clone()));

    let result = chain.run(None).await;

    assert_eq!(result.status, RunStatus::Partial);
    assert!(result.failed_step.is_none());
    assert_eq!(result.steps.len(), 3);
    assert_eq!(result.step("two").unwrap().status, StepStatus::Error);
    assert_eq!(last.calls(), 1);

    // The failed step did not replace the carried slush
    let upstream = last.last_inputs().upstream_slush.unwrap();
    assert_eq!(upstream.previous().unwrap().get("topic"), Some(&json!("rust")));
    assert_eq!(result.final_result.unwrap()["agent"], json!("last"));
}

#[tokio::test]
async fn test_emitted_slush_flows_to_next_step_and_transform() {
    let first = Arc::new(MockAgent::ok("first").emitting(signal("confidence", json!(0.9))));
    let second = Arc::new(MockAgent::ok("second"));

    let mut chain = AgentChain::default();
    chain
        .add_step(ChainStep::new("score", first))
        .add_step(
            ChainStep::new("act", second.clone()).with_transform(|previous, slush| {
                let mut extra = Payload::new();
                extra.insert("previous_agent".to_string(), previous["agent"].clone());
                if let Some(slush) = slush {
                    extra.insert(
                        "confidence".to_string(),
                        slush.get("confidence").cloned().unwrap_or_default(),
                    );
                }
                extra
            }),
        );

    let result = chain.run(None).await;
    assert_eq!(result.status, RunStatus::Success);

    let inputs = second.last_inputs();
    assert_eq!(inputs.get("previous_agent"), Some(&json!("first")));
    assert_eq!(inputs.get("confidence"), Some(&json!(0.9)));
    assert_eq!(
        inputs.upstream_slush.unwrap().previous().unwrap().get("confidence"),
        Some(&json!(0.9))
    );
}

#[tokio::test]
async fn test_step_timeout_is_a_step_failure() {
    let slow = Arc::new(MockAgent::ok("slow").slow(Duration::from_secs(5)));
    let after = Arc::new(MockAgent::ok("after"));

    let mut chain = AgentChain::new(ChainOptions {
        stop_on_error: true,
        step_timeout: Some(Duration::from_millis(50)),
    });
    chain
        .add_step(ChainStep::new("wait", slow))
        .add_step(ChainStep::new("after", after.clone()));

    let result = chain.run(None).await;

    assert_eq!(result.status, RunStatus::Error);
    assert_eq!(result.failed_step.as_deref(), Some("wait"));
    assert_eq!(result.error.as_deref(), Some("Step timeout after 50ms"));
    assert_eq!(after.calls(), 0);
}

#[tokio::test]
async fn test_step_timeout_override_wins() {
    let slow = Arc::new(MockAgent::ok("slow").slow(Duration::from_millis(30)));

    let mut chain = AgentChain::new(ChainOptions {
        stop_on_error: true,
        step_timeout: Some(Duration::from_millis(5)),
    });
    chain.add_step(ChainStep::new("patient", slow).with_timeout(Duration::from_secs(5)));

    let result = chain.run(None).await;
    assert_eq!(result.status, RunStatus::Success);
}

#[tokio::test]
async fn test_initial_inputs_reach_first_step() {
    let first = Arc::new(MockAgent::ok("first"));

    let mut chain = AgentChain::default();
    chain.add_step(ChainStep::new("only", first.clone()));
    assert_eq!(chain.len(), 1);

    let initial = Payload::from_iter([("query".to_string(), json!("weather in Oslo"))]);
    chain.run(Some(initial)).await;

    assert_eq!(first.last_inputs().get("query"), Some(&json!("weather in Oslo")));
}
