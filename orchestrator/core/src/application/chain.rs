// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pipeline Executor
//!
//! Runs [`ChainStep`]s strictly in declared order, forwarding each step's slush
//! to the next one. A step that emits no slush gets a placeholder naming the
//! step and its status.

use crate::application::invoke::invoke_agent;
use crate::domain::agent::{AgentInputs, AgentResult, Payload};
use crate::domain::chain::{ChainOptions, ChainResult, ChainStep, ChainStepResult, StepStatus};
use crate::domain::events::ChainEvent;
use crate::domain::run::{RunId, RunStatus};
use crate::domain::slush::{Slush, UpstreamSlush};
use crate::infrastructure::event_bus::EventBus;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct AgentChain {
    steps: Vec<ChainStep>,
    options: ChainOptions,
    event_bus: Option<Arc<EventBus>>,
}

impl AgentChain {
    pub fn new(options: ChainOptions) -> Self {
        Self {
            steps: Vec::new(),
            options,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Append a step. Steps run in the order they are added.
    ///
    /// Step names should be unique; a repeated name is accepted with a
    /// warning, and [`ChainResult::step`] resolves it to the first match.
    pub fn add_step(&mut self, step: ChainStep) -> &mut Self {
        if self.steps.iter().any(|existing| existing.name == step.name) {
            warn!(step = %step.name, "Chain already has a step with this name");
        }
        self.steps.push(step);
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn options(&self) -> &ChainOptions {
        &self.options
    }

    /// Execute every step in order.
    ///
    /// `initial` is merged into the first step's inputs only; the step's own
    /// static inputs override it. The run never fails as a whole: failures are
    /// reported through [`ChainResult::status`].
    pub async fn run(&self, initial: Option<Payload>) -> ChainResult {
        let run_id = RunId::new();
        let started = Instant::now();

        info!(run_id = %run_id, steps = self.steps.len(), "Starting chain run");
        self.publish(ChainEvent::ChainStarted {
            run_id,
            step_count: self.steps.len(),
            started_at: Utc::now(),
        });

        let mut results = Vec::with_capacity(self.steps.len());
        let mut carried: Option<Slush> = None;
        let mut last_payload: Option<Payload> = None;
        let mut status = RunStatus::Success;
        let mut halted: Option<(String, String)> = None;

        for (index, step) in self.steps.iter().enumerate() {
            let inputs = self.build_inputs(
                index,
                step,
                initial.as_ref(),
                last_payload.as_ref(),
                carried.as_ref(),
            );
            let timeout = step.timeout.or(self.options.step_timeout);

            debug!(run_id = %run_id, step = %step.name, agent = %step.agent.name(), "Dispatching chain step");
            let step_started = Instant::now();
            let result = invoke_agent(step.agent.as_ref(), inputs, timeout, "Step").await;
            let duration_ms = step_started.elapsed().as_millis() as u64;

            match result {
                AgentResult::Success(output) => {
                    let slush = output.slush.unwrap_or_else(|| {
                        Slush::placeholder(
                            step.agent.name(),
                            [
                                ("step_name", json!(step.name)),
                                ("step_result_status", json!(StepStatus::Success.as_str())),
                            ],
                        )
                    });
                    carried = Some(slush.clone());
                    last_payload = Some(output.payload.clone());

                    record_step(StepStatus::Success, duration_ms);
                    self.publish(ChainEvent::StepCompleted {
                        run_id,
                        step: step.name.clone(),
                        agent_name: step.agent.name().to_string(),
                        duration_ms,
                        completed_at: Utc::now(),
                    });

                    results.push(ChainStepResult {
                        name: step.name.clone(),
                        agent_name: step.agent.name().to_string(),
                        status: StepStatus::Success,
                        payload: Some(output.payload),
                        error: None,
                        slush: Some(slush),
                        duration_ms,
                    });
                }
                AgentResult::Error(failure) => {
                    warn!(
                        run_id = %run_id,
                        step = %step.name,
                        error = %failure.message,
                        "Chain step failed"
                    );
                    record_step(StepStatus::Error, duration_ms);
                    self.publish(ChainEvent::StepFailed {
                        run_id,
                        step: step.name.clone(),
                        agent_name: step.agent.name().to_string(),
                        error: failure.message.clone(),
                        failed_at: Utc::now(),
                    });

                    // The carried slush stays as it was before this step
                    results.push(ChainStepResult {
                        name: step.name.clone(),
                        agent_name: step.agent.name().to_string(),
                        status: StepStatus::Error,
                        payload: None,
                        error: Some(failure.message.clone()),
                        slush: carried.clone(),
                        duration_ms,
                    });

                    if self.options.stop_on_error {
                        status = RunStatus::Error;
                        halted = Some((step.name.clone(), failure.message));
                        break;
                    }
                    status = RunStatus::Partial;
                }
            }
        }

        let total_duration_ms = started.elapsed().as_millis() as u64;
        metrics::histogram!("conductor_chain_duration_ms").record(total_duration_ms as f64);
        info!(
            run_id = %run_id,
            status = %status,
            duration_ms = total_duration_ms,
            "Chain run finished"
        );
        self.publish(ChainEvent::ChainCompleted {
            run_id,
            status,
            total_duration_ms,
            completed_at: Utc::now(),
        });

        let (failed_step, error) = match halted {
            Some((step, message)) => (Some(step), Some(message)),
            None => (None, None),
        };

        ChainResult {
            run_id,
            status,
            steps: results,
            total_duration_ms,
            final_result: last_payload,
            final_slush: carried,
            failed_step,
            error,
        }
    }

    /// Inputs precedence, lowest first: initial inputs (first step only),
    /// static step inputs, transform output. Upstream slush rides separately.
    fn build_inputs(
        &self,
        index: usize,
        step: &ChainStep,
        initial: Option<&Payload>,
        last_payload: Option<&Payload>,
        carried: Option<&Slush>,
    ) -> AgentInputs {
        let mut inputs = AgentInputs::default();

        if index == 0 {
            if let Some(initial) = initial {
                inputs.merge(initial);
            }
        }
        inputs.merge(&step.inputs);

        if let (Some(transform), Some(previous)) = (&step.transform, last_payload) {
            inputs.merge(&transform(previous, carried));
        }

        if let Some(slush) = carried {
            inputs.upstream_slush = Some(UpstreamSlush::Previous(slush.clone()));
        }

        inputs
    }

    fn publish(&self, event: ChainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish_chain_event(event);
        }
    }
}

impl Default for AgentChain {
    fn default() -> Self {
        Self::new(ChainOptions::default())
    }
}

fn record_step(status: StepStatus, duration_ms: u64) {
    metrics::counter!("conductor_chain_steps_total", "status" => status.as_str()).increment(1);
    metrics::histogram!("conductor_chain_step_duration_ms").record(duration_ms as f64);
}
