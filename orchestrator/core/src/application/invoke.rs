// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::agent::{Agent, AgentInputs, AgentResult};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

/// Run one agent call under an optional time budget.
///
/// An expired budget and a panicking agent both come back as
/// `AgentResult::Error`, so callers handle them like any other failure.
/// `label` prefixes the timeout message ("Step", "Node").
pub async fn invoke_agent(
    agent: &dyn Agent,
    inputs: AgentInputs,
    timeout: Option<Duration>,
    label: &str,
) -> AgentResult {
    let call = AssertUnwindSafe(agent.execute(inputs)).catch_unwind();

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(outcome) => outcome,
            Err(_) => return AgentResult::timed_out(label, limit),
        },
        None => call.await,
    };

    outcome.unwrap_or_else(|panic| {
        AgentResult::error(format!(
            "Agent \"{}\" panicked: {}",
            agent.name(),
            panic_message(panic.as_ref())
        ))
    })
}

/// Text carried by a caught panic payload.
pub fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
