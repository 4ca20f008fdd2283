// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Conductor Core
//!
//! Agent orchestration kernel: the agent invocation contract, the sequential
//! pipeline and the DAG scheduler.
//!
//! # Architecture
//!
//! - **Domain:** agent contract, slush, declarations, graph algorithms, config
//! - **Application:** pipeline and graph executors
//! - **Infrastructure:** in-process event bus

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use application::chain::AgentChain;
pub use application::graph::AgentGraph;
pub use domain::*;
