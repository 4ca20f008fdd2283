// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod invoke;
pub mod chain;
pub mod graph;

pub use chain::AgentChain;
pub use graph::AgentGraph;
pub use invoke::{invoke_agent, panic_message};
